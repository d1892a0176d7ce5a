use anyhow::{Context, Result};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ShowSource, ShowStore, WorkQueue};
use crate::database_ops::shows::UpsertOutcome;
use crate::model::ShowId;

/// What happened to one dequeued id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    Created,
    Updated,
    /// The catalog no longer knows the show; nothing was written.
    Missing,
}

impl From<UpsertOutcome> for Processed {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Created => Processed::Created,
            UpsertOutcome::Updated => Processed::Updated,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub created: u64,
    pub updated: u64,
    pub missing: u64,
    pub failed: u64,
}

impl WorkerStats {
    pub fn processed(&self) -> u64 {
        self.created + self.updated + self.missing + self.failed
    }

    fn record(&mut self, outcome: Processed) {
        match outcome {
            Processed::Created => self.created += 1,
            Processed::Updated => self.updated += 1,
            Processed::Missing => self.missing += 1,
        }
    }
}

/// Drains the queue: fetch the full show, write it with its cast, move on.
pub struct UpsertWorker {
    name: String,
    source: Arc<dyn ShowSource>,
    store: Arc<dyn ShowStore>,
    queue: Arc<WorkQueue<ShowId>>,
}

impl UpsertWorker {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn ShowSource>,
        store: Arc<dyn ShowStore>,
        queue: Arc<WorkQueue<ShowId>>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            store,
            queue,
        }
    }

    /// Fetches and stores a single show.
    pub async fn process(&self, id: ShowId) -> Result<Processed> {
        let Some(show) = self
            .source
            .fetch_show(id)
            .await
            .with_context(|| format!("fetching show {id}"))?
        else {
            warn!(worker = %self.name, show_id = %id, "worker: show not found upstream; skipping");
            return Ok(Processed::Missing);
        };
        let outcome = self
            .store
            .upsert_show_with_cast(&show)
            .await
            .with_context(|| format!("storing show {id}"))?;
        debug!(worker = %self.name, show_id = %id, ?outcome, cast = show.cast.len(), "worker: stored");
        Ok(outcome.into())
    }

    /// Runs until `shutdown` fires or the queue is closed. Failures are logged with the id
    /// and the id is dropped; nothing is put back on the queue. An id already taken off the
    /// queue is finished before the loop looks at `shutdown` again; a source sharing the
    /// token gives up its fetch early, a started store write always completes.
    pub async fn run(&self, shutdown: CancellationToken) -> WorkerStats {
        let mut stats = WorkerStats::default();
        info!(worker = %self.name, "worker: started");
        loop {
            let id = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(worker = %self.name, "worker: shutdown");
                    break;
                }
                next = self.queue.dequeue() => match next {
                    Some(id) => id,
                    None => {
                        info!(worker = %self.name, "worker: queue closed");
                        break;
                    }
                },
            };

            match AssertUnwindSafe(self.process(id)).catch_unwind().await {
                Ok(Ok(outcome)) => stats.record(outcome),
                Ok(Err(e)) => {
                    stats.failed += 1;
                    error!(worker = %self.name, show_id = %id, error = ?e, "worker: processing failed");
                }
                Err(_) => {
                    stats.failed += 1;
                    error!(worker = %self.name, show_id = %id, "worker: processing panicked");
                }
            }
        }
        info!(
            worker = %self.name,
            created = stats.created,
            updated = stats.updated,
            missing = stats.missing,
            failed = stats.failed,
            "worker: stopped"
        );
        stats
    }
}
