use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::{ShowSource, ShowStore, WorkQueue};
use crate::model::ShowId;

/// Shows per catalog index page.
pub const INDEX_PAGE_SIZE: i64 = 250;

/// Walks the catalog index past the highest stored id, storing bare shows and queueing
/// them so the worker fills in their cast.
pub struct SeedJob {
    source: Arc<dyn ShowSource>,
    store: Arc<dyn ShowStore>,
    queue: Arc<WorkQueue<ShowId>>,
}

impl SeedJob {
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

    /// Seeds the index page that holds the id after the highest stored one. Returns how many
    /// shows were written.
    pub async fn run_once(&self) -> Result<usize> {
        let t0 = Instant::now();
        let last_id = self.store.last_show_id().await.context("loading last show id")?;
        let page = last_id / INDEX_PAGE_SIZE;

        let shows = self
            .source
            .fetch_index_page(page)
            .await
            .with_context(|| format!("fetching index page {page}"))?;
        if shows.is_empty() {
            info!(page, last_id, "seed: nothing new");
            return Ok(0);
        }

        let written = self
            .store
            .upsert_shows(&shows)
            .await
            .with_context(|| format!("storing index page {page}"))?;
        let enqueued = self.queue.enqueue_many(shows.iter().map(|s| s.id));
        info!(
            page,
            written,
            enqueued,
            elapsed_ms = %t0.elapsed().as_millis(),
            "seed: page stored"
        );
        Ok(written)
    }

    /// Up to `max_pages` consecutive passes. Stops early on an empty page or once the highest
    /// stored id stops moving (the last page was already complete).
    pub async fn run(&self, max_pages: u32) -> Result<usize> {
        let mut total = 0;
        let mut last_id = self.store.last_show_id().await?;
        for _ in 0..max_pages.max(1) {
            let written = self.run_once().await?;
            total += written;
            if written == 0 {
                break;
            }
            let now = self.store.last_show_id().await?;
            if now <= last_id {
                break;
            }
            last_id = now;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::shows::UpsertOutcome;
    use crate::model::{Marker, Show};
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, HashMap};

    fn bare(id: i64) -> Show {
        Show {
            id: ShowId::new(id),
            name: format!("Show {id}"),
            genres: Vec::new(),
            premiered: None,
            ended: None,
            updated: 1,
            cast: Vec::new(),
        }
    }

    /// Catalog whose index holds ids `1..=total`; page `p` covers `p*250+1 ..= (p+1)*250`.
    struct IndexSource {
        total: i64,
        pages_requested: Mutex<Vec<i64>>,
    }

    impl IndexSource {
        fn new(total: i64) -> Self {
            Self {
                total,
                pages_requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ShowSource for IndexSource {
        async fn fetch_show(&self, _id: ShowId) -> Result<Option<Show>> {
            Ok(None)
        }
        async fn fetch_updates(&self) -> Result<HashMap<ShowId, Marker>> {
            Ok(HashMap::new())
        }
        async fn fetch_index_page(&self, page: i64) -> Result<Vec<Show>> {
            self.pages_requested.lock().push(page);
            let first = page * INDEX_PAGE_SIZE + 1;
            let last = ((page + 1) * INDEX_PAGE_SIZE).min(self.total);
            Ok((first..=last).map(bare).collect())
        }
    }

    #[derive(Default)]
    struct MapStore(Mutex<BTreeMap<i64, Show>>);

    #[async_trait::async_trait]
    impl ShowStore for MapStore {
        async fn last_updated_markers(&self) -> Result<HashMap<ShowId, Marker>> {
            Ok(self.0.lock().values().map(|s| (s.id, s.updated)).collect())
        }
        async fn upsert_show_with_cast(&self, show: &Show) -> Result<UpsertOutcome> {
            let prev = self.0.lock().insert(show.id.get(), show.clone());
            Ok(if prev.is_some() {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Created
            })
        }
        async fn upsert_shows(&self, shows: &[Show]) -> Result<usize> {
            let mut guard = self.0.lock();
            for s in shows {
                guard.insert(s.id.get(), s.clone());
            }
            Ok(shows.len())
        }
        async fn last_show_id(&self) -> Result<i64> {
            Ok(self.0.lock().keys().next_back().copied().unwrap_or(0))
        }
    }

    fn job(total: i64) -> (SeedJob, Arc<IndexSource>, Arc<MapStore>, Arc<WorkQueue<ShowId>>) {
        let source = Arc::new(IndexSource::new(total));
        let store = Arc::new(MapStore::default());
        let queue = Arc::new(WorkQueue::new());
        let job = SeedJob::new(source.clone(), store.clone(), queue.clone());
        (job, source, store, queue)
    }

    #[tokio::test]
    async fn first_run_starts_at_page_zero_and_queues_every_id() {
        let (job, source, store, queue) = job(100);
        assert_eq!(job.run_once().await.unwrap(), 100);
        assert_eq!(*source.pages_requested.lock(), vec![0]);
        assert_eq!(store.0.lock().len(), 100);
        assert_eq!(queue.len(), 100);
    }

    #[tokio::test]
    async fn page_follows_the_highest_stored_id() {
        let (job, source, store, _) = job(600);
        store.upsert_shows(&[bare(510)]).await.unwrap();
        job.run_once().await.unwrap();
        assert_eq!(*source.pages_requested.lock(), vec![2]);
    }

    #[tokio::test]
    async fn empty_page_writes_nothing() {
        let (job, _, store, queue) = job(0);
        assert_eq!(job.run_once().await.unwrap(), 0);
        assert!(store.0.lock().is_empty());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn multi_page_run_stops_once_caught_up() {
        let (job, source, store, _) = job(600);
        let written = job.run(10).await.unwrap();
        assert_eq!(store.0.lock().len(), 600);
        // Pages 0, 1 and 2 fill the store; page 2 again adds nothing past id 600.
        assert_eq!(*source.pages_requested.lock(), vec![0, 1, 2, 2]);
        assert_eq!(written, 250 + 250 + 100 + 100);
    }
}
