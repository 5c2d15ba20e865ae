use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::llm_error::LlmError;

/// Backoff configuration for [`retry_with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Symmetric jitter fraction applied to the computed delay, e.g. `0.1` for ±10%.
    pub jitter: f64,
    /// If true, a `RateLimit` error's `retry_after` floors the computed delay.
    pub honor_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
            honor_retry_after: true,
        }
    }
}

impl RetryConfig {
    fn delay_for_attempt(&self, attempt: u32, retry_after: Option<f64>) -> Duration {
        let base = self.min_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let mut delay = base.min(self.max_delay.as_secs_f64());

        if self.honor_retry_after {
            if let Some(retry_after) = retry_after {
                delay = delay.max(retry_after);
            }
        }

        if self.jitter > 0.0 {
            let jitter_range = self.jitter * delay;
            let offset = rand::rng().random_range(-jitter_range..=jitter_range);
            delay = (delay + offset).max(0.0);
        }

        Duration::from_secs_f64(delay)
    }
}

/// Runs `op` up to `cfg.max_retries + 1` times.
///
/// Non-`LlmError` failures and non-retryable `LlmError`s are surfaced
/// immediately. Retryable `LlmError`s sleep for an exponentially growing,
/// jittered delay (floored by `retry_after` when present and honored) and
/// try again. `on_retry`, if given, is invoked with `(attempt, delay, &err)`
/// before each sleep — attempt is 1-based, counting the failed attempt that
/// triggered this retry.
pub async fn retry_with_backoff<Op, Fut, T, E, OnRetry>(
    cfg: &RetryConfig,
    mut op: Op,
    mut on_retry: OnRetry,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: AsRef<LlmError> + From<LlmError>,
    OnRetry: FnMut(u32, Duration, &E),
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let llm_err = err.as_ref();
                if !llm_err.retryable() || attempt as usize >= cfg.max_retries {
                    return Err(err);
                }

                let delay = cfg.delay_for_attempt(attempt, llm_err.retry_after());
                attempt += 1;
                on_retry(attempt, delay, &err);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Convenience wrapper for callers that don't need an `on_retry` observer.
pub async fn retry_with_backoff_silent<Op, Fut, T, E>(cfg: &RetryConfig, op: Op) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: AsRef<LlmError> + From<LlmError>,
{
    retry_with_backoff(cfg, op, |attempt, delay, err| {
        warn!(attempt, ?delay, error = %err.as_ref(), "llm call failed, retrying");
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    #[derive(Debug)]
    struct TestError(LlmError);
    impl AsRef<LlmError> for TestError {
        fn as_ref(&self) -> &LlmError {
            &self.0
        }
    }
    impl From<LlmError> for TestError {
        fn from(e: LlmError) -> Self {
            TestError(e)
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let cfg = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let result: Result<&str, TestError> = retry_with_backoff(
            &cfg,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("ok") }
            },
            |_, _, _| {},
        )
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_error_raised_immediately() {
        let cfg = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let result: Result<&str, TestError> = retry_with_backoff(
            &cfg,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError(LlmError::from_kind(ErrorKind::Authentication, "openai"))) }
            },
            |_, _, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn max_retries_zero_tries_exactly_once() {
        let cfg = RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<&str, TestError> = retry_with_backoff(
            &cfg,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError(LlmError::from_kind(ErrorKind::Timeout, "openai"))) }
            },
            |_, _, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_max_then_surfaces_last_error() {
        let cfg = RetryConfig {
            max_retries: 3,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
            ..RetryConfig::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<&str, TestError> = retry_with_backoff(
            &cfg,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError(LlmError::from_kind(ErrorKind::Network, "openai"))) }
            },
            |_, _, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn retry_after_floors_the_delay() {
        let cfg = RetryConfig {
            max_retries: 3,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_secs(5),
            jitter: 0.0,
            honor_retry_after: true,
            ..RetryConfig::default()
        };
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let result: Result<&str, TestError> = retry_with_backoff(
            &cfg,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(TestError(LlmError::RateLimit {
                            provider: "openai".to_string(),
                            status_code: Some(429),
                            retryable: true,
                            retry_after: Some(0.05),
                        }))
                    } else {
                        Ok("ok")
                    }
                }
            },
            |_, _, _| {},
        )
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn on_retry_observer_invoked_before_each_sleep() {
        let cfg = RetryConfig {
            max_retries: 2,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: 0.0,
            ..RetryConfig::default()
        };
        let calls = AtomicU32::new(0);
        let observed = AtomicU32::new(0);
        let _: Result<&str, TestError> = retry_with_backoff(
            &cfg,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError(LlmError::from_kind(ErrorKind::Stream, "openai"))) }
            },
            |_, _, _| {
                observed.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;
        assert_eq!(observed.load(Ordering::SeqCst), 2);
    }
}
