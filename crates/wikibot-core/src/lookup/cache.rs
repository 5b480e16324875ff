use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use moka::{future::Cache, policy::EvictionPolicy};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{
    errors::Error,
    lookup::{LookupClient, SearchResults, SummaryOutcome},
    Result,
};

/// Summary attempts per article before a disambiguation chain is abandoned.
pub const DISAMBIGUATION_ATTEMPTS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Operation {
    Search,
    Article,
    Link,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct LookupKey {
    op: Operation,
    lang: String,
    arg: String,
}

impl LookupKey {
    fn new(op: Operation, lang: &str, arg: &str) -> Self {
        Self {
            op,
            lang: lang.to_string(),
            arg: arg.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
enum Cached {
    Search(Arc<SearchResults>),
    /// Article summary or link; `None` is the definitive "no result" marker.
    Text(Option<String>),
}

/// Counters tracking cache effectiveness.
#[derive(Debug, Default)]
pub struct CacheStats {
    lookups: AtomicU64,
    computations: AtomicU64,
}

impl CacheStats {
    /// Lookups answered without calling the client.
    pub fn hits(&self) -> u64 {
        self.lookups().saturating_sub(self.misses())
    }

    /// Lookups that ran a client computation.
    pub fn misses(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lookups={} hits={} misses={}",
            self.lookups(),
            self.hits(),
            self.misses()
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LookupCacheConfig {
    pub capacity: u64,
    pub summary_sentences: usize,
    /// Hold one global lock around every client computation.
    pub serialize_calls: bool,
}

/// Memoizing, bounded front-end for a [`LookupClient`].
///
/// Identical `(operation, lang, argument)` keys are computed at most once at a
/// time: concurrent callers wait for the first caller's result. Transport
/// errors are returned to every waiter but never stored.
pub struct LookupCache {
    client: Arc<dyn LookupClient>,
    entries: Cache<LookupKey, Cached>,
    gate: Option<Mutex<()>>,
    summary_sentences: usize,
    stats: CacheStats,
}

impl LookupCache {
    pub fn new(client: Arc<dyn LookupClient>, cfg: LookupCacheConfig) -> Self {
        Self {
            client,
            entries: Cache::builder()
                .max_capacity(cfg.capacity)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
            gate: cfg.serialize_calls.then(|| Mutex::new(())),
            summary_sentences: cfg.summary_sentences,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub async fn search(&self, lang: &str, text: &str) -> Result<Arc<SearchResults>> {
        let key = LookupKey::new(Operation::Search, lang, text);
        match self
            .get_or_compute(key, async {
                let results = self.client.search(lang, text).await?;
                Ok(Cached::Search(Arc::new(results)))
            })
            .await?
        {
            Cached::Search(results) => Ok(results),
            Cached::Text(_) => Err(mismatch(Operation::Search)),
        }
    }

    /// Summary of `title`, following up to [`DISAMBIGUATION_ATTEMPTS`] disambiguation hops.
    pub async fn article(&self, lang: &str, title: &str) -> Result<Option<String>> {
        let key = LookupKey::new(Operation::Article, lang, title);
        match self
            .get_or_compute(key, async {
                let summary =
                    resolve_summary(self.client.as_ref(), lang, title, self.summary_sentences)
                        .await?;
                Ok(Cached::Text(summary))
            })
            .await?
        {
            Cached::Text(summary) => Ok(summary),
            Cached::Search(_) => Err(mismatch(Operation::Article)),
        }
    }

    pub async fn link(&self, lang: &str, title: &str) -> Result<Option<String>> {
        let key = LookupKey::new(Operation::Link, lang, title);
        match self
            .get_or_compute(key, async {
                let url = self.client.canonical_link(lang, title).await?;
                Ok(Cached::Text(url))
            })
            .await?
        {
            Cached::Text(url) => Ok(url),
            Cached::Search(_) => Err(mismatch(Operation::Link)),
        }
    }

    async fn get_or_compute<F>(&self, key: LookupKey, compute: F) -> Result<Cached>
    where
        F: std::future::Future<Output = Result<Cached>>,
    {
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);
        let op = key.op;
        self.entries
            .try_get_with(key, async {
                self.stats.computations.fetch_add(1, Ordering::Relaxed);
                let _guard = self.enter().await;
                let out = compute.await;
                if let Err(e) = &out {
                    warn!(?op, error = %e, "lookup failed");
                }
                debug!(?op, stats = %self.stats, "lookup computed");
                out
            })
            .await
            .map_err(|e| Error::External(e.to_string()))
    }

    async fn enter(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        }
    }
}

fn mismatch(op: Operation) -> Error {
    Error::External(format!("cache entry kind mismatch for {op:?}"))
}

async fn resolve_summary(
    client: &dyn LookupClient,
    lang: &str,
    title: &str,
    max_sentences: usize,
) -> Result<Option<String>> {
    let mut title = title.to_string();
    for _ in 0..DISAMBIGUATION_ATTEMPTS {
        match client.summary(lang, &title, max_sentences).await? {
            SummaryOutcome::Summary(text) => return Ok(Some(text)),
            SummaryOutcome::NotFound => return Ok(None),
            SummaryOutcome::Disambiguation(options) => match options.into_iter().next() {
                Some(next) => {
                    debug!(from = %title, to = %next, "following disambiguation");
                    title = next;
                }
                None => return Ok(None),
            },
        }
    }
    Ok(None)
}
