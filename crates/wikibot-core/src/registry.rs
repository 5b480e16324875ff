//! Content-addressed title registry.
//!
//! Titles are too long for Telegram's 64-byte `callback_data`, so buttons carry
//! a short digest of the title instead. The digest is a pure function of the
//! title; the durable store keeps the reverse index needed to turn a token back
//! into its title.

use std::{fmt::Write, sync::Arc};

use moka::{future::Cache, policy::EvictionPolicy};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{errors::Error, store::KvStore, Result};

/// Hex characters kept from the SHA-256 digest.
pub const TOKEN_LEN: usize = 40;

/// Deterministic token for `title`.
pub fn title_token(title: &str) -> String {
    let mut h = Sha256::new();
    h.update(title.as_bytes());
    hex_prefix(&h.finalize(), TOKEN_LEN)
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
        if out.len() >= len {
            break;
        }
    }
    out.truncate(len);
    out
}

fn token_key(token: &str) -> String {
    format!("token:{token}")
}

fn title_key(title: &str) -> String {
    format!("title:{title}")
}

pub struct TitleRegistry {
    store: Arc<dyn KvStore>,
    tokens: Cache<String, String>,
    titles: Cache<String, String>,
}

impl TitleRegistry {
    pub fn new(store: Arc<dyn KvStore>, capacity: u64) -> Self {
        Self {
            store,
            tokens: Cache::builder()
                .max_capacity(capacity)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
            titles: Cache::builder()
                .max_capacity(capacity)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
        }
    }

    /// Token for `title`, registering the reverse mapping on first use.
    pub async fn token_for(&self, title: &str) -> Result<String> {
        let store = Arc::clone(&self.store);
        let owned = title.to_string();
        let token = self
            .tokens
            .try_get_with(owned.clone(), async move {
                let token = title_token(&owned);
                if store.get(&token_key(&token)).await?.is_none() {
                    debug!(token = %token, title = %owned, "registering title");
                    store
                        .set_many(vec![
                            (token_key(&token), owned.clone()),
                            (title_key(&owned), token.clone()),
                        ])
                        .await?;
                }
                Ok::<_, Error>(token)
            })
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        self.titles.insert(token.clone(), title.to_string()).await;
        Ok(token)
    }

    /// Title registered for `token`, if any. Misses are not cached.
    pub async fn title_for(&self, token: &str) -> Result<Option<String>> {
        let store = Arc::clone(&self.store);
        let owned = token.to_string();
        let found = self
            .titles
            .try_get_with(owned.clone(), async move {
                let title = store.get(&token_key(&owned)).await?;
                title.ok_or(Lookup::Missing)
            })
            .await;

        match found {
            Ok(title) => Ok(Some(title)),
            Err(e) => match e.as_ref() {
                Lookup::Missing => Ok(None),
                Lookup::Failed(msg) => Err(Error::Store(msg.clone())),
            },
        }
    }
}

enum Lookup {
    Missing,
    Failed(String),
}

impl From<Error> for Lookup {
    fn from(e: Error) -> Self {
        Lookup::Failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// SQLite store that counts reads.
    struct CountingStore {
        inner: SqliteStore,
        gets: AtomicUsize,
    }

    #[async_trait]
    impl KvStore for CountingStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set(key, value).await
        }

        async fn set_many(&self, pairs: Vec<(String, String)>) -> Result<()> {
            self.inner.set_many(pairs).await
        }

        async fn push_front_truncated(&self, key: &str, value: &str, max_len: usize) -> Result<()> {
            self.inner.push_front_truncated(key, value, max_len).await
        }

        async fn list(&self, key: &str, limit: usize) -> Result<Vec<String>> {
            self.inner.list(key, limit).await
        }
    }

    fn registry() -> (Arc<dyn KvStore>, TitleRegistry) {
        let store: Arc<dyn KvStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let reg = TitleRegistry::new(store.clone(), 16);
        (store, reg)
    }

    #[test]
    fn token_is_short_hex_and_stable() {
        let t = title_token("Rust (programming language)");
        assert_eq!(t.len(), TOKEN_LEN);
        assert!(t.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(t, title_token("Rust (programming language)"));
        assert_ne!(t, title_token("Rust"));
    }

    #[tokio::test]
    async fn token_for_is_idempotent_and_round_trips() {
        let (_store, reg) = registry();
        for title in ["Москва", "C++", "Rust (programming language)", ""] {
            let a = reg.token_for(title).await.unwrap();
            let b = reg.token_for(title).await.unwrap();
            assert_eq!(a, b);
            assert_eq!(a, title_token(title));
            assert_eq!(reg.title_for(&a).await.unwrap().as_deref(), Some(title));
        }
    }

    #[tokio::test]
    async fn both_directions_are_persisted() {
        let (store, reg) = registry();
        let token = reg.token_for("Berlin").await.unwrap();

        assert_eq!(
            store.get(&token_key(&token)).await.unwrap().as_deref(),
            Some("Berlin")
        );
        assert_eq!(
            store.get(&title_key("Berlin")).await.unwrap().as_deref(),
            Some(token.as_str())
        );
    }

    #[tokio::test]
    async fn unknown_token_is_none_and_not_cached() {
        let (store, reg) = registry();
        let token = title_token("Paris");
        assert_eq!(reg.title_for(&token).await.unwrap(), None);

        // Registered later through another process sharing the store.
        store
            .set_many(vec![(token_key(&token), "Paris".to_string())])
            .await
            .unwrap();
        assert_eq!(reg.title_for(&token).await.unwrap().as_deref(), Some("Paris"));
    }

    #[tokio::test]
    async fn cold_registry_resolves_tokens_from_store() {
        let (store, reg) = registry();
        let token = reg.token_for("Tokyo").await.unwrap();
        drop(reg);

        let fresh = TitleRegistry::new(store, 16);
        assert_eq!(fresh.title_for(&token).await.unwrap().as_deref(), Some("Tokyo"));
    }

    #[tokio::test]
    async fn front_caches_are_bounded_and_fall_back_to_store() {
        let store = Arc::new(CountingStore {
            inner: SqliteStore::open_in_memory().unwrap(),
            gets: AtomicUsize::new(0),
        });
        let reg = TitleRegistry::new(store.clone(), 2);

        let titles = ["Oslo", "Lima", "Quito", "Accra", "Hanoi"];
        let mut tokens = Vec::new();
        for title in titles {
            tokens.push(reg.token_for(title).await.unwrap());
        }

        reg.tokens.run_pending_tasks().await;
        reg.titles.run_pending_tasks().await;
        assert!(reg.tokens.entry_count() <= 2);
        assert!(reg.titles.entry_count() <= 2);

        let before = store.gets.load(Ordering::SeqCst);
        assert_eq!(reg.title_for(&tokens[0]).await.unwrap().as_deref(), Some("Oslo"));
        assert_eq!(store.gets.load(Ordering::SeqCst), before + 1);
    }
}
