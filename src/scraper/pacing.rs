//! Bounded waits, jittered pauses and retry policy.

use crate::config::PacingConfig;
use crate::error::{CrawlError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

/// Run a driver call under a deadline.
pub async fn bounded<T>(
    limit: Duration,
    what: &'static str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(CrawlError::from),
        Err(_) => Err(CrawlError::Timeout { limit, what }),
    }
}

/// Like [`bounded`], but a timeout is logged and treated as "carry on".
pub async fn tolerate_timeout(
    limit: Duration,
    what: &'static str,
    fut: impl Future<Output = anyhow::Result<()>>,
) -> Result<()> {
    match bounded(limit, what, fut).await {
        Err(e) if e.is_timeout() => {
            debug!("{}", e);
            Ok(())
        }
        other => other,
    }
}

/// Sleep `base_ms` plus up to `jitter_ms` of random extra.
pub async fn pause(base_ms: u64, jitter_ms: u64) {
    let extra = if jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=jitter_ms)
    };
    let total = base_ms + extra;
    if total > 0 {
        sleep(Duration::from_millis(total)).await;
    }
}

/// Fixed settle window after a UI action.
pub async fn settle(ms: u64) {
    pause(ms, 0).await;
}

/// Retry `op` with exponential backoff: `initial_load_retries` extra attempts
/// spaced `retry_base_ms`, doubling, capped at 30 s.
pub async fn with_retries<T, F, Fut>(pacing: &PacingConfig, what: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let strategy = ExponentialBackoff::from_millis(2)
        .factor(pacing.retry_base_ms / 2)
        .max_delay(Duration::from_secs(30))
        .map(jitter)
        .take(pacing.initial_load_retries);

    let mut attempt = 0u32;
    Retry::spawn(strategy, || {
        attempt += 1;
        let fut = op();
        async move {
            let result = fut.await;
            if let Err(e) = &result {
                warn!("{} failed (attempt {}): {}", what, attempt, e);
            }
            result
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            sleep(Duration::from_secs(5)).await;
            Ok(())
        };
        let err = bounded(Duration::from_millis(10), "slow thing", slow).await.unwrap_err();
        assert!(err.is_timeout());
        assert_ok!(tolerate_timeout(Duration::from_millis(10), "slow", std::future::pending()).await);
    }

    #[tokio::test]
    async fn test_bounded_passes_driver_errors_through() {
        let failing = async { Err::<(), _>(anyhow::anyhow!("detached")) };
        let err = assert_err!(tolerate_timeout(Duration::from_secs(1), "click", failing).await);
        assert!(matches!(err, CrawlError::Driver(_)));
    }

    #[tokio::test]
    async fn test_with_retries_gives_up_after_budget() {
        let pacing = PacingConfig::immediate();
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries(&pacing, "load", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CrawlError::Driver(anyhow::anyhow!("refused"))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1 + pacing.initial_load_retries as u32);
    }

    #[tokio::test]
    async fn test_with_retries_returns_first_success() {
        let pacing = PacingConfig::immediate();
        let calls = AtomicU32::new(0);
        let value = with_retries(&pacing, "load", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CrawlError::Driver(anyhow::anyhow!("flaky")))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(value.unwrap(), 1);
    }
}
