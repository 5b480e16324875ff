//! Long-poll ingestion loop.
//!
//! One stream of updates, many concurrent handlers: every update is spawned as
//! its own task and the offset moves past the batch without waiting for them.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::{
    domain::UpdateId,
    messaging::{port::UpdateSource, types::IncomingUpdate},
    Result,
};

/// Handles one update end to end. Errors are logged by the loop, never retried.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, update: IncomingUpdate) -> Result<()>;
}

pub struct IngestionLoop {
    source: Arc<dyn UpdateSource>,
    handler: Arc<dyn UpdateHandler>,
    poll_timeout: Duration,
    offset: UpdateId,
    tracker: TaskTracker,
}

impl IngestionLoop {
    /// Starts at offset 0: the platform re-delivers whatever was never confirmed.
    pub fn new(
        source: Arc<dyn UpdateSource>,
        handler: Arc<dyn UpdateHandler>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            source,
            handler,
            poll_timeout,
            offset: UpdateId::default(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn offset(&self) -> UpdateId {
        self.offset
    }

    /// Poll once, schedule every update in the batch, advance the offset.
    ///
    /// Returns the number of scheduled updates (0 for an empty or failed poll).
    pub async fn poll_once(&mut self) -> usize {
        let batch = match self.source.get_updates(self.offset, self.poll_timeout).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(offset = %self.offset, error = %e, "getUpdates failed");
                return 0;
            }
        };

        let Some(last) = batch.iter().map(|u| u.update_id).max() else {
            return 0;
        };

        let scheduled = batch.len();
        for update in batch {
            self.schedule(update);
        }

        self.offset = self.offset.max(last.next());
        debug!(scheduled, offset = %self.offset, "batch scheduled");
        scheduled
    }

    fn schedule(&self, update: IncomingUpdate) {
        let handler = Arc::clone(&self.handler);
        let update_id = update.update_id;
        let task = self
            .tracker
            .spawn(async move { handler.handle(update).await });

        // Observe the outcome without holding up the stream.
        self.tracker.spawn(async move {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(update_id = %update_id, error = %e, "update handling failed"),
                Err(e) if e.is_panic() => {
                    error!(update_id = %update_id, "update handler panicked")
                }
                Err(e) => warn!(update_id = %update_id, error = %e, "update handler aborted"),
            }
        });
    }

    /// Poll until `cancel` fires, then wait for in-flight handlers.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("ingestion loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.poll_once() => {}
            }
        }

        self.tracker.close();
        info!(in_flight = self.tracker.len(), "ingestion loop stopping");
        self.tracker.wait().await;
        info!("ingestion loop stopped");
    }

    /// Wait until every handler scheduled so far has finished.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
