//! Encyclopedia lookups: the client port and its memoizing front-end.

use async_trait::async_trait;

use crate::Result;

pub mod cache;
#[cfg(test)]
pub(crate) mod fake;

pub use cache::{CacheStats, LookupCache};

/// Ranked search hits plus an optional "did you mean" spelling suggestion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchResults {
    pub titles: Vec<String>,
    pub suggestion: Option<String>,
}

/// Outcome of a summary request for one title.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SummaryOutcome {
    Summary(String),
    /// The title names a disambiguation page; these are the candidate articles.
    Disambiguation(Vec<String>),
    NotFound,
}

/// Encyclopedia capability (search / summary / link).
///
/// The language is an explicit argument on every call; implementations must
/// not keep a "current language" between calls.
#[async_trait]
pub trait LookupClient: Send + Sync {
    async fn search(&self, lang: &str, query: &str) -> Result<SearchResults>;

    async fn summary(&self, lang: &str, title: &str, max_sentences: usize) -> Result<SummaryOutcome>;

    /// Canonical article URL, or `None` when the page does not exist.
    async fn canonical_link(&self, lang: &str, title: &str) -> Result<Option<String>>;
}
