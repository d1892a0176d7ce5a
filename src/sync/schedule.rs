use anyhow::Result;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

/// Runs `job` now and then every `period` until `shutdown` fires. A failed run is logged and
/// the loop waits for the next tick; a run already in progress is never interrupted.
/// Returns how many runs completed (successfully or not).
pub async fn run_every<F, Fut, T>(
    name: &str,
    period: Duration,
    shutdown: CancellationToken,
    mut job: F,
) -> u64
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut runs = 0u64;
    let mut failures = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!(job = name, runs, failures, "{name}: shutdown");
                break;
            }
            _ = ticker.tick() => {}
        }

        let t0 = Instant::now();
        let result = job().instrument(info_span!("tick", job = name)).await;
        runs += 1;
        match result {
            Ok(_) => {
                info!(
                    job = name,
                    elapsed_ms = %t0.elapsed().as_millis(),
                    total_runs = runs,
                    failures,
                    "{name}: tick complete"
                );
            }
            Err(e) => {
                failures += 1;
                error!(job = name, error = ?e, failures, "{name}: tick failed; retrying next interval");
            }
        }
    }
    runs
}
