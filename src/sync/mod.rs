//! Incremental synchronization pipeline: detector → queue → worker → store.

pub mod detector;
pub mod queue;
pub mod schedule;
pub mod seed;
pub mod worker;

use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;

use crate::catalog::CatalogClient;
use crate::database_ops::shows::UpsertOutcome;
use crate::model::{Marker, Show, ShowId};
use crate::util::env::{env_flag, env_parse};

pub use detector::{ChangeDetector, ChangeSet};
pub use queue::WorkQueue;
pub use seed::SeedJob;
pub use worker::{Processed, UpsertWorker, WorkerStats};

/// Where shows come from.
#[async_trait::async_trait]
pub trait ShowSource: Send + Sync {
    async fn fetch_show(&self, id: ShowId) -> Result<Option<Show>>;
    async fn fetch_updates(&self) -> Result<HashMap<ShowId, Marker>>;
    async fn fetch_index_page(&self, page: i64) -> Result<Vec<Show>>;
}

/// Where shows go.
#[async_trait::async_trait]
pub trait ShowStore: Send + Sync {
    async fn last_updated_markers(&self) -> Result<HashMap<ShowId, Marker>>;
    async fn upsert_show_with_cast(&self, show: &Show) -> Result<UpsertOutcome>;
    async fn upsert_shows(&self, shows: &[Show]) -> Result<usize>;
    async fn last_show_id(&self) -> Result<i64>;
}

#[async_trait::async_trait]
impl ShowSource for CatalogClient {
    async fn fetch_show(&self, id: ShowId) -> Result<Option<Show>> {
        Ok(CatalogClient::fetch_show(self, id).await?)
    }

    async fn fetch_updates(&self) -> Result<HashMap<ShowId, Marker>> {
        Ok(CatalogClient::fetch_updates(self).await?)
    }

    async fn fetch_index_page(&self, page: i64) -> Result<Vec<Show>> {
        Ok(CatalogClient::fetch_index_page(self, page).await?)
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub detect_interval: Duration,
    pub seed_interval: Duration,
    pub seed_enabled: bool,
    pub seed_pages_per_run: u32,
    pub worker_count: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            detect_interval: Duration::from_secs(12 * 60 * 60),
            seed_interval: Duration::from_secs(24 * 60 * 60),
            seed_enabled: true,
            seed_pages_per_run: 1,
            worker_count: 1,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            detect_interval: Duration::from_secs(
                env_parse("DETECT_INTERVAL_SECS", d.detect_interval.as_secs()).max(1),
            ),
            seed_interval: Duration::from_secs(
                env_parse("SEED_INTERVAL_SECS", d.seed_interval.as_secs()).max(1),
            ),
            seed_enabled: env_flag("SEED_ENABLED", d.seed_enabled),
            seed_pages_per_run: env_parse("SEED_PAGES_PER_RUN", d.seed_pages_per_run).max(1),
            worker_count: env_parse("WORKER_COUNT", d.worker_count).max(1),
        }
    }
}
