//! Durable key-value storage used by the title registry and user state.

use async_trait::async_trait;

use crate::Result;

mod sqlite;

pub use sqlite::SqliteStore;

/// Minimal durable store: string keys to string values, plus bounded lists.
///
/// No cross-key transactions are offered beyond [`KvStore::set_many`].
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write every pair or none of them.
    async fn set_many(&self, pairs: Vec<(String, String)>) -> Result<()>;

    /// Prepend `value` to the list at `key`, keeping only the newest `max_len` items.
    async fn push_front_truncated(&self, key: &str, value: &str, max_len: usize) -> Result<()>;

    /// Up to `limit` items of the list at `key`, newest first.
    async fn list(&self, key: &str, limit: usize) -> Result<Vec<String>>;
}
