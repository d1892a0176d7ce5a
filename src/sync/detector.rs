use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{ShowSource, ShowStore, WorkQueue};
use crate::model::{Marker, ShowId};

/// Ids that need a refresh, split by why.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Known remotely, never stored locally.
    pub new: Vec<ShowId>,
    /// Stored locally with a marker that differs from the remote one.
    pub outdated: Vec<ShowId>,
}

impl ChangeSet {
    /// Compares a remote snapshot against the local one. Ids only known locally are ignored,
    /// and any marker difference counts, not just a newer one.
    pub fn diff(remote: &HashMap<ShowId, Marker>, local: &HashMap<ShowId, Marker>) -> Self {
        let mut set = ChangeSet::default();
        for (id, marker) in remote {
            match local.get(id) {
                None => set.new.push(*id),
                Some(known) if known != marker => set.outdated.push(*id),
                Some(_) => {}
            }
        }
        set.new.sort_unstable();
        set.outdated.sort_unstable();
        set
    }

    pub fn len(&self) -> usize {
        self.new.len() + self.outdated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.outdated.is_empty()
    }

    /// New ids first, then outdated ones.
    pub fn ids(&self) -> impl Iterator<Item = ShowId> + '_ {
        self.new.iter().chain(self.outdated.iter()).copied()
    }
}

pub struct ChangeDetector {
    source: Arc<dyn ShowSource>,
    store: Arc<dyn ShowStore>,
    queue: Arc<WorkQueue<ShowId>>,
}

impl ChangeDetector {
    pub fn new(
        source: Arc<dyn ShowSource>,
        store: Arc<dyn ShowStore>,
        queue: Arc<WorkQueue<ShowId>>,
    ) -> Self {
        Self {
            source,
            store,
            queue,
        }
    }

    /// One detection pass: snapshot both sides, diff, and hand every changed id to the queue.
    pub async fn detect_and_enqueue(&self) -> Result<ChangeSet> {
        let t0 = Instant::now();
        let remote = self
            .source
            .fetch_updates()
            .await
            .context("fetching remote update markers")?;
        let local = self
            .store
            .last_updated_markers()
            .await
            .context("loading local update markers")?;
        debug!(remote = remote.len(), local = local.len(), "detector: snapshots loaded");

        let changes = ChangeSet::diff(&remote, &local);
        let enqueued = if changes.is_empty() {
            0
        } else {
            self.queue.enqueue_many(changes.ids())
        };

        info!(
            new = changes.new.len(),
            outdated = changes.outdated.len(),
            enqueued,
            elapsed_ms = %t0.elapsed().as_millis(),
            "detector: pass complete"
        );
        Ok(changes)
    }
}
