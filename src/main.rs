use anyhow::{Context, Result};
use showhub::api::ApiServer;
use showhub::catalog::{CatalogClient, CatalogConfig};
use showhub::database_ops::db::Db;
use showhub::logging::init_tracing;
use showhub::model::ShowId;
use showhub::sync::schedule::run_every;
use showhub::sync::{
    ChangeDetector, SeedJob, ShowSource, ShowStore, SyncConfig, UpsertWorker, WorkQueue,
};
use showhub::util::env as env_util;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing()?;

    let sync_cfg = SyncConfig::from_env();
    let catalog_cfg = CatalogConfig::from_env();
    info!(
        catalog = %catalog_cfg.base_url,
        detect_every_s = sync_cfg.detect_interval.as_secs(),
        seed_every_s = sync_cfg.seed_interval.as_secs(),
        seed_enabled = sync_cfg.seed_enabled,
        workers = sync_cfg.worker_count,
        "showhub: starting"
    );

    let database_url = env_util::db_url();
    let max_connections: u32 = env_util::env_parse("DB_MAX_CONNS", 5u32);
    let db = Db::connect(&database_url, max_connections)
        .await
        .context("connecting to database")?;
    db.migrate().await?;

    let shutdown = CancellationToken::new();
    let source: Arc<dyn ShowSource> =
        Arc::new(CatalogClient::new(catalog_cfg)?.with_shutdown(shutdown.clone()));
    let store: Arc<dyn ShowStore> = Arc::new(db.clone());
    let queue: Arc<WorkQueue<ShowId>> = Arc::new(WorkQueue::new());
    let mut tasks = JoinSet::new();

    // --- upsert workers ------------------------------------------------------
    for n in 0..sync_cfg.worker_count {
        let worker = UpsertWorker::new(
            format!("worker-{n}"),
            source.clone(),
            store.clone(),
            queue.clone(),
        );
        let token = shutdown.clone();
        tasks.spawn(async move {
            worker.run(token).await;
        });
    }

    // --- change detector -----------------------------------------------------
    {
        let detector = ChangeDetector::new(source.clone(), store.clone(), queue.clone());
        let token = shutdown.clone();
        let period = sync_cfg.detect_interval;
        tasks.spawn(async move {
            run_every("detector", period, token, || detector.detect_and_enqueue()).await;
        });
    }

    // --- index seeding -------------------------------------------------------
    if sync_cfg.seed_enabled {
        let seed = SeedJob::new(source.clone(), store.clone(), queue.clone());
        let token = shutdown.clone();
        let period = sync_cfg.seed_interval;
        let pages = sync_cfg.seed_pages_per_run;
        tasks.spawn(async move {
            run_every("seed", period, token, || seed.run(pages)).await;
        });
    } else {
        info!("seed: disabled (SEED_ENABLED=false)");
    }

    // --- read API ------------------------------------------------------------
    {
        let server = ApiServer::from_env();
        let db_api = db.clone();
        let token = shutdown.clone();
        tasks.spawn(async move {
            if let Err(e) = server.run(db_api, token.clone()).await {
                error!(error = ?e, "api: server failed");
                token.cancel();
            }
        });
    }

    // --- Ctrl+C waiter & graceful shutdown ----------------------------------
    info!("service started; press Ctrl+C to stop");
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!(error = %e, "shutdown: failed to listen for Ctrl+C");
            }
            info!("shutdown: Ctrl+C received");
        }
        _ = shutdown.cancelled() => {
            info!("shutdown: requested by a failing task");
        }
    }

    shutdown.cancel();
    info!("shutdown: gracefully stopping {} task(s)...", tasks.len());
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "task join error");
        }
    }

    db.pool.close().await;
    info!("all tasks stopped; goodbye");
    Ok(())
}
