pub mod api;
pub mod catalog;
pub mod database_ops;
pub mod logging;
pub mod model;
pub mod sync;

pub mod util {
    pub mod env;
}

pub use catalog::{CatalogClient, CatalogConfig};
pub use database_ops::db::Db;
pub use model::{Marker, Person, Show, ShowId};
pub use sync::{ChangeDetector, SeedJob, SyncConfig, UpsertWorker, WorkQueue};
