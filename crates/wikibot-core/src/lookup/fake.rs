//! Scriptable [`LookupClient`] for tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    errors::Error,
    lookup::{LookupClient, SearchResults, SummaryOutcome},
    Result,
};

#[derive(Default)]
pub(crate) struct FakeLookup {
    searches: HashMap<String, SearchResults>,
    summaries: HashMap<String, SummaryOutcome>,
    links: HashMap<String, String>,
    delay: Option<Duration>,
    failing_searches: AtomicUsize,
    search_calls: AtomicUsize,
    summary_calls: AtomicUsize,
    link_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<(String, String, String)>>,
}

impl FakeLookup {
    pub(crate) fn with_search(mut self, query: &str, titles: &[&str], suggestion: Option<&str>) -> Self {
        self.searches.insert(
            query.to_string(),
            SearchResults {
                titles: titles.iter().map(|t| t.to_string()).collect(),
                suggestion: suggestion.map(str::to_string),
            },
        );
        self
    }

    pub(crate) fn with_summary(mut self, title: &str, outcome: SummaryOutcome) -> Self {
        self.summaries.insert(title.to_string(), outcome);
        self
    }

    pub(crate) fn with_link(mut self, title: &str, url: &str) -> Self {
        self.links.insert(title.to_string(), url.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `n` search calls with a transport error.
    pub(crate) fn failing_searches(self, n: usize) -> Self {
        self.failing_searches.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn link_calls(&self) -> usize {
        self.link_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// `(operation, lang, argument)` for every client call, in order.
    pub(crate) fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, op: &str, lang: &str, arg: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((op.to_string(), lang.to_string(), arg.to_string()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LookupClient for FakeLookup {
    async fn search(&self, lang: &str, query: &str) -> Result<SearchResults> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.enter("search", lang, query).await;
        self.leave();

        let fail = self
            .failing_searches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(Error::External("search unavailable".to_string()));
        }
        Ok(self.searches.get(query).cloned().unwrap_or_default())
    }

    async fn summary(&self, lang: &str, title: &str, _max_sentences: usize) -> Result<SummaryOutcome> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        self.enter("summary", lang, title).await;
        self.leave();
        Ok(self
            .summaries
            .get(title)
            .cloned()
            .unwrap_or(SummaryOutcome::NotFound))
    }

    async fn canonical_link(&self, lang: &str, title: &str) -> Result<Option<String>> {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        self.enter("link", lang, title).await;
        self.leave();
        Ok(self.links.get(title).cloned())
    }
}
