//! Per-activity retry policies and the activity executor.
//!
//! Activities run with at-least-once semantics: an attempt that times out or
//! fails with a retryable kind is re-run after an exponentially growing
//! interval, up to the attempt budget. Error kinds listed in the policy's
//! non-retryable set fail the activity immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use sitrep_core::error::{Error, Result};

/// Retry policy attached to one activity invocation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_coefficient: f64,
    pub non_retryable_error_kinds: Vec<&'static str>,
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            non_retryable_error_kinds: Vec::new(),
        }
    }

    /// Two attempts with short backoff; tool failures and bad input are
    /// terminal. Used for enumeration-tool steps.
    pub fn enumeration() -> Self {
        RetryPolicy {
            max_attempts: 2,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(2),
            backoff_coefficient: 2.0,
            non_retryable_error_kinds: vec![
                "BadInput",
                "EnumerationToolError",
                "NoDomainsFoundError",
            ],
        }
    }

    /// Five attempts with short backoff; bad input is terminal. Used for
    /// probe/parse/publish steps.
    pub fn publish() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(2),
            backoff_coefficient: 2.0,
            non_retryable_error_kinds: vec!["BadInput"],
        }
    }

    /// Whether the policy allows retrying this error.
    pub fn allows_retry(&self, err: &Error) -> bool {
        !self.non_retryable_error_kinds.contains(&err.kind())
    }

    /// Sleep interval before the given (1-based) retry attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.backoff_coefficient.powi(attempt.saturating_sub(1) as i32);
        let interval = self.initial_interval.mul_f64(factor);
        interval.min(self.max_interval)
    }
}

/// Options for one activity invocation.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    pub start_to_close_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ActivityOptions {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        ActivityOptions {
            start_to_close_timeout: timeout,
            retry,
        }
    }
}

/// Execute an activity under its timeout and retry policy.
///
/// Cancellation is cooperative: dropping the returned future (as the worker
/// does on shutdown) cancels the in-flight attempt at its next suspension
/// point.
pub async fn execute_activity<T, F, Fut>(name: &str, options: &ActivityOptions, run: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        info!(activity = name, attempt, "activity attempt started");
        let outcome = tokio::time::timeout(options.start_to_close_timeout, run()).await;
        let error = match outcome {
            Ok(Ok(value)) => {
                info!(activity = name, attempt, "activity completed");
                return Ok(value);
            }
            Ok(Err(e)) => e,
            Err(_) => Error::TransientNetwork(format!(
                "activity {name} timed out after {} seconds",
                options.start_to_close_timeout.as_secs()
            )),
        };

        if !options.retry.allows_retry(&error) || attempt >= options.retry.max_attempts {
            warn!(activity = name, attempt, error = %error, "activity failed");
            return Err(error);
        }

        let delay = options.retry.backoff(attempt);
        warn!(activity = name, attempt, error = %error, delay_ms = delay.as_millis() as u64,
              "activity attempt failed, retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn options(retry: RetryPolicy) -> ActivityOptions {
        ActivityOptions::new(Duration::from_secs(5), retry)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let result: Result<i32> =
            execute_activity("ok", &options(RetryPolicy::publish()), || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let mut retry = RetryPolicy::publish();
        retry.initial_interval = Duration::from_millis(1);
        retry.max_interval = Duration::from_millis(2);
        let result = execute_activity("flaky", &options(retry), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::TransientNetwork("boom".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_kind_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = execute_activity(
            "enum",
            &options(RetryPolicy::enumeration()),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::EnumerationTool("exit 1".into())) }
            },
        )
        .await;
        assert_eq!(result.unwrap_err().kind(), "EnumerationToolError");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_budget_is_honoured() {
        let calls = AtomicU32::new(0);
        let mut retry = RetryPolicy::enumeration();
        retry.initial_interval = Duration::from_millis(1);
        let result: Result<()> = execute_activity("always-down", &options(retry), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::TransientNetwork("down".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_as_transient() {
        let calls = AtomicU32::new(0);
        let mut retry = RetryPolicy::publish();
        retry.max_attempts = 2;
        retry.initial_interval = Duration::from_millis(1);
        let opts = ActivityOptions::new(Duration::from_millis(20), retry);
        let result: Result<()> = execute_activity("slow", &opts, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), "TransientNetwork");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let retry = RetryPolicy {
            max_attempts: 5,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(3),
            backoff_coefficient: 2.0,
            non_retryable_error_kinds: vec![],
        };
        assert_eq!(retry.backoff(1), Duration::from_secs(1));
        assert_eq!(retry.backoff(2), Duration::from_secs(2));
        assert_eq!(retry.backoff(3), Duration::from_secs(3));
        assert_eq!(retry.backoff(4), Duration::from_secs(3));
    }
}
