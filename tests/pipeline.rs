//! End-to-end sync: detector → queue → worker → SQLite, with an in-process catalog.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use showhub::database_ops::db::Db;
use showhub::database_ops::shows;
use showhub::model::{Marker, Person, Show, ShowId};
use showhub::sync::{
    ChangeDetector, SeedJob, ShowSource, ShowStore, UpsertWorker, WorkQueue, WorkerStats,
};
use tokio_util::sync::CancellationToken;

/// Mutable in-memory catalog; records every show fetch.
#[derive(Default)]
struct FakeCatalog {
    shows: Mutex<HashMap<ShowId, Show>>,
    fetched: Mutex<Vec<ShowId>>,
}

impl FakeCatalog {
    fn put(&self, show: Show) {
        self.shows.lock().insert(show.id, show);
    }

    fn take_fetched(&self) -> Vec<ShowId> {
        let mut ids = std::mem::take(&mut *self.fetched.lock());
        ids.sort_unstable();
        ids
    }
}

#[async_trait::async_trait]
impl ShowSource for FakeCatalog {
    async fn fetch_show(&self, id: ShowId) -> Result<Option<Show>> {
        self.fetched.lock().push(id);
        Ok(self.shows.lock().get(&id).cloned())
    }

    async fn fetch_updates(&self) -> Result<HashMap<ShowId, Marker>> {
        Ok(self
            .shows
            .lock()
            .values()
            .map(|s| (s.id, s.updated))
            .collect())
    }

    async fn fetch_index_page(&self, page: i64) -> Result<Vec<Show>> {
        let mut shows: Vec<Show> = self
            .shows
            .lock()
            .values()
            .filter(|s| s.id.get() / 250 == page)
            .map(|s| Show {
                cast: Vec::new(),
                ..s.clone()
            })
            .collect();
        shows.sort_by_key(|s| s.id);
        Ok(shows)
    }
}

fn show(id: i64, updated: Marker, cast: &[(i64, &str)]) -> Show {
    Show {
        id: ShowId::new(id),
        name: format!("Show {id}"),
        genres: vec!["Drama".to_string()],
        premiered: None,
        ended: None,
        updated,
        cast: cast
            .iter()
            .map(|&(pid, name)| Person {
                id: pid,
                name: name.to_string(),
                birthday: None,
                deathday: None,
                gender: None,
            })
            .collect(),
    }
}

struct Pipeline {
    db: Db,
    catalog: Arc<FakeCatalog>,
    queue: Arc<WorkQueue<ShowId>>,
    detector: ChangeDetector,
    seed: SeedJob,
}

impl Pipeline {
    async fn new() -> Self {
        let db = Db::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let catalog = Arc::new(FakeCatalog::default());
        let queue = Arc::new(WorkQueue::new());
        let store: Arc<dyn ShowStore> = Arc::new(db.clone());
        let detector = ChangeDetector::new(catalog.clone(), store.clone(), queue.clone());
        let seed = SeedJob::new(catalog.clone(), store, queue.clone());
        Self {
            db,
            catalog,
            queue,
            detector,
            seed,
        }
    }

    /// Runs `workers` workers until the queue is drained and they are idle again.
    async fn drain(&self, workers: usize) -> WorkerStats {
        let shutdown = CancellationToken::new();
        let mut handles = Vec::new();
        for n in 0..workers {
            let worker = UpsertWorker::new(
                format!("test-{n}"),
                self.catalog.clone(),
                Arc::new(self.db.clone()),
                self.queue.clone(),
            );
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move { worker.run(token).await }));
        }
        while !self.queue.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Every id is off the queue; a worker finishes the one it holds before it sees this.
        shutdown.cancel();

        let mut total = WorkerStats::default();
        for h in handles {
            let s = h.await.unwrap();
            total.created += s.created;
            total.updated += s.updated;
            total.missing += s.missing;
            total.failed += s.failed;
        }
        total
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn detector_and_worker_converge_on_the_catalog() {
    let p = Pipeline::new().await;
    p.catalog.put(show(1, 100, &[(10, "A"), (11, "B")]));
    p.catalog.put(show(2, 200, &[(11, "B")]));
    p.catalog.put(show(3, 300, &[]));

    let changes = p.detector.detect_and_enqueue().await.unwrap();
    assert_eq!(changes.new.len(), 3);
    let stats = p.drain(2).await;
    assert_eq!(stats.created, 3);
    assert_eq!(stats.failed, 0);

    let local = shows::last_updated_markers(&p.db).await.unwrap();
    assert_eq!(local, p.catalog.fetch_updates().await.unwrap());
    let stored = shows::find_show(&p.db, ShowId::new(1)).await.unwrap().unwrap();
    assert_eq!(stored.cast.len(), 2);
    p.catalog.take_fetched();

    // Only the show whose marker moved is fetched again.
    p.catalog.put(show(2, 250, &[(12, "C")]));
    let changes = p.detector.detect_and_enqueue().await.unwrap();
    assert!(changes.new.is_empty());
    assert_eq!(changes.outdated, vec![ShowId::new(2)]);
    let stats = p.drain(1).await;
    assert_eq!(stats.updated, 1);
    assert_eq!(p.catalog.take_fetched(), vec![ShowId::new(2)]);

    let two = shows::find_show(&p.db, ShowId::new(2)).await.unwrap().unwrap();
    assert_eq!(two.updated, 250);
    assert_eq!(two.cast.iter().map(|c| c.id).collect::<Vec<_>>(), vec![12]);

    // Nothing left to do.
    assert!(p.detector.detect_and_enqueue().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn show_gone_upstream_is_skipped() {
    let p = Pipeline::new().await;
    p.queue.enqueue(ShowId::new(404));
    let stats = p.drain(1).await;
    assert_eq!(stats.missing, 1);
    assert_eq!(shows::count_shows(&p.db).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn seeded_shows_get_their_cast_from_the_worker() {
    let p = Pipeline::new().await;
    p.catalog.put(show(5, 1, &[(50, "Lead")]));
    p.catalog.put(show(6, 1, &[]));

    assert_eq!(p.seed.run_once().await.unwrap(), 2);
    assert_eq!(shows::count_shows(&p.db).await.unwrap(), 2);
    let bare = shows::find_show(&p.db, ShowId::new(5)).await.unwrap().unwrap();
    assert!(bare.cast.is_empty());

    let stats = p.drain(1).await;
    assert_eq!(stats.updated, 2);
    let full = shows::find_show(&p.db, ShowId::new(5)).await.unwrap().unwrap();
    assert_eq!(full.cast.len(), 1);

    // Markers already match, so the detector has nothing to add.
    assert!(p.detector.detect_and_enqueue().await.unwrap().is_empty());
}
