use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::{errors::Error, store::KvStore, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS list_items (
    key   TEXT NOT NULL,
    seq   INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (key, seq)
);
";

/// [`KvStore`] backed by a single SQLite connection.
///
/// Every call runs on the blocking pool via `spawn_blocking`; the connection
/// mutex serialises writers.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file. Blocks briefly; call during startup.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening sqlite store");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 5_000_i32)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        debug!("opening in-memory sqlite store");
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| Error::Store(format!("connection mutex poisoned: {e}")))?;
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(vec![(key.to_string(), value.to_string())])
            .await
    }

    async fn set_many(&self, pairs: Vec<(String, String)>) -> Result<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for (key, value) in &pairs {
                tx.execute(
                    "INSERT INTO kv (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn push_front_truncated(&self, key: &str, value: &str, max_len: usize) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        let keep = i64::try_from(max_len).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let next_seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM list_items WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO list_items (key, seq, value) VALUES (?1, ?2, ?3)",
                params![key, next_seq, value],
            )?;
            tx.execute(
                "DELETE FROM list_items
                 WHERE key = ?1 AND seq NOT IN (
                     SELECT seq FROM list_items WHERE key = ?1 ORDER BY seq DESC LIMIT ?2
                 )",
                params![key, keep],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        let key = key.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT value FROM list_items WHERE key = ?1 ORDER BY seq DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![key, limit], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_overwrites_and_set_many_writes_all() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("a", "1").await.unwrap();
        store.set("a", "2").await.unwrap();
        store
            .set_many(vec![
                ("b".to_string(), "3".to_string()),
                ("c".to_string(), "4".to_string()),
            ])
            .await
            .unwrap();

        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("3"));
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn list_is_newest_first_and_truncated() {
        let store = SqliteStore::open_in_memory().unwrap();
        for v in ["one", "two", "three", "two"] {
            store.push_front_truncated("l", v, 3).await.unwrap();
        }

        assert_eq!(
            store.list("l", 10).await.unwrap(),
            vec!["two", "three", "two"]
        );
        assert_eq!(store.list("l", 1).await.unwrap(), vec!["two"]);
        assert!(store.list("other", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let path = std::env::temp_dir().join(format!(
            "wikibot-store-{}-{}.sqlite3",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set("k", "v").await.unwrap();
            store.push_front_truncated("l", "x", 5).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.list("l", 5).await.unwrap(), vec!["x"]);

        drop(store);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("sqlite3-wal"));
        let _ = std::fs::remove_file(path.with_extension("sqlite3-shm"));
    }
}
