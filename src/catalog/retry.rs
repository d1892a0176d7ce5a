use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

type BackoffFn = dyn Fn(u32) -> Duration + Send + Sync;

/// Retry decorator for catalog calls.
///
/// The wrapped operation runs once, then up to `max_retries` more times while the
/// retryable predicate keeps flagging its result. Retry `n` (1-based) waits `backoff(n)`.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Arc<BackoffFn>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Arc::new(exponential_with_jitter),
        }
    }

    pub fn with_backoff<F>(mut self, backoff: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Total number of attempts a call may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        (self.backoff)(retry)
    }

    /// Runs `op` until it yields a result the predicate does not flag, or retries run out.
    ///
    /// `retryable` returns a short reason when the result should be retried. When retries
    /// are exhausted the last result is returned unchanged; callers decide what a still
    /// transient result means to them.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&Result<T, E>) -> Option<String>,
    {
        let mut retry = 0u32;
        loop {
            let result = op(retry).await;
            let Some(reason) = retryable(&result) else {
                return result;
            };
            if retry >= self.max_retries {
                return result;
            }
            retry += 1;
            let wait = self.delay_for(retry);
            warn!(
                retry,
                max_retries = self.max_retries,
                reason = %reason,
                wait_ms = wait.as_millis() as u64,
                "transient catalog failure; backing off"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// `2^retry` seconds plus up to a second of random jitter so concurrent workers spread out.
pub fn exponential_with_jitter(retry: u32) -> Duration {
    let base = Duration::from_secs(1u64 << retry.min(16));
    let jitter_ms = rand::thread_rng().gen_range(0..1000u64);
    base + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant() -> RetryPolicy {
        RetryPolicy::new(3).with_backoff(|_| Duration::ZERO)
    }

    fn flag_errors(r: &Result<&'static str, &'static str>) -> Option<String> {
        r.as_ref().err().map(|e| e.to_string())
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt_without_a_fourth() {
        let calls = AtomicU32::new(0);
        let result = instant()
            .run(
                |_| {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n < 3 {
                            Err("429")
                        } else {
                            Ok("body")
                        }
                    }
                },
                flag_errors,
            )
            .await;
        assert_eq!(result, Ok("body"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_three_retries() {
        let calls = AtomicU32::new(0);
        let result = instant()
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<&'static str, _>("timeout") }
                },
                flag_errors,
            )
            .await;
        assert_eq!(result, Err("timeout"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_retryable_results_return_immediately() {
        let calls = AtomicU32::new(0);
        let result = instant()
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<&'static str, _>("404") }
                },
                |_| None,
            )
            .await;
        assert_eq!(result, Err("404"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_attempts() {
        let policy = RetryPolicy::new(2).with_backoff(|n| Duration::from_secs(2u64.pow(n)));
        let started = tokio::time::Instant::now();
        let _ = policy
            .run(|_| async { Err::<(), _>("503") }, flag_unit_errors)
            .await;
        // 2s before retry 1, 4s before retry 2.
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    fn flag_unit_errors(r: &Result<(), &'static str>) -> Option<String> {
        r.as_ref().err().map(|e| e.to_string())
    }

    #[test]
    fn default_backoff_is_exponential_with_sub_second_jitter() {
        for retry in 1..=3u32 {
            let base = Duration::from_secs(2u64.pow(retry));
            for _ in 0..20 {
                let d = exponential_with_jitter(retry);
                assert!(d >= base, "retry {retry}: {d:?} below {base:?}");
                assert!(d < base + Duration::from_secs(1), "retry {retry}: {d:?} too long");
            }
        }
    }
}
