//! Retry with exponential backoff for outbound calls
//!
//! Every call to a handler, the search API or the language model goes through
//! `RetryingExecutor`. Errors arrive already classified (`UpstreamError`);
//! only transient kinds are retried, permanent kinds return after one attempt.
//! Cancellation is checked before every call and every sleep, and a sleep is
//! raced against the token, so a cancelled request never waits out a backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorKind, UpstreamError};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first call included
    pub max_attempts: u32,

    /// Backoff before attempt n+1 is `multiplier * 2^(n-1)` seconds, clamped
    pub multiplier: f64,

    /// Lower bound of every backoff
    pub min_wait: Duration,

    /// Upper bound of every backoff
    pub max_wait: Duration,

    /// Maximum wall time a call may spend including backoffs
    pub budget: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: 1.0,
            min_wait: Duration::from_secs(3),
            max_wait: Duration::from_secs(10),
            budget: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    /// Policy without any waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            multiplier: 0.0,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
            budget: None,
        }
    }

    /// Upper end of the jitter window after `attempt` failed attempts
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let max = self.max_wait.max(self.min_wait);
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let secs = self.multiplier * 2f64.powi(exponent);
        let raw = if secs.is_finite() && secs >= 0.0 {
            Duration::try_from_secs_f64(secs).unwrap_or(max)
        } else {
            max
        };
        raw.clamp(self.min_wait, max)
    }

    /// Jittered delay, uniform in `[min_wait, backoff_ceiling(attempt)]`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        let low = self.min_wait.as_millis() as u64;
        let high = ceiling.as_millis() as u64;
        if high <= low {
            return ceiling;
        }
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }
}

/// Per-call bookkeeping, dropped once the call resolves
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<ErrorKind>,
    pub next_delay: Option<Duration>,
}

/// Result of a call plus how many attempts it took
#[derive(Debug)]
pub struct Execution<T> {
    pub result: Result<T, UpstreamError>,
    pub attempts: u32,
}

/// Executor for outbound calls with bounded retries
#[derive(Debug, Clone, Default)]
pub struct RetryingExecutor {
    policy: RetryPolicy,
}

impl RetryingExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` until it succeeds, fails permanently, runs out of attempts
    /// or budget, or `cancel` fires. The last classified error is returned unchanged.
    pub async fn execute<T, F, Fut>(&self, label: &str, call: F, cancel: &CancellationToken) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        self.execute_traced(label, call, cancel).await.result
    }

    /// Like `execute` for calls with their own error type, classified by `classify`
    pub async fn execute_with<T, E, F, Fut, C>(
        &self,
        label: &str,
        mut call: F,
        classify: C,
        cancel: &CancellationToken,
    ) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        C: Fn(&E) -> ErrorKind,
    {
        let classify = &classify;
        self.execute(
            label,
            move || {
                let fut = call();
                async move { fut.await.map_err(|e| UpstreamError::new(classify(&e), e.to_string())) }
            },
            cancel,
        )
        .await
    }

    /// Like `execute`, also reporting the number of attempts made
    pub async fn execute_traced<T, F, Fut>(&self, label: &str, mut call: F, cancel: &CancellationToken) -> Execution<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let started = Instant::now();
        let mut state = RetryState::default();

        loop {
            if cancel.is_cancelled() {
                return Execution {
                    result: Err(UpstreamError::cancelled(label)),
                    attempts: state.attempt,
                };
            }

            state.attempt += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(UpstreamError::cancelled(label)),
                result = call() => result,
            };

            let err = match result {
                Ok(value) => {
                    tracing::debug!(label, attempt = state.attempt, "outbound call succeeded");
                    return Execution {
                        result: Ok(value),
                        attempts: state.attempt,
                    };
                }
                Err(err) => err,
            };

            state.last_error = Some(err.kind);
            tracing::debug!(
                label,
                attempt = state.attempt,
                max_attempts,
                kind = %err.kind,
                "outbound call failed"
            );

            if !err.kind.is_retryable() {
                return Execution {
                    result: Err(err),
                    attempts: state.attempt,
                };
            }

            if state.attempt >= max_attempts {
                tracing::warn!(label, attempts = state.attempt, kind = %err.kind, "retries exhausted");
                return Execution {
                    result: Err(err),
                    attempts: state.attempt,
                };
            }

            let delay = self.policy.delay_for(state.attempt);
            state.next_delay = Some(delay);

            if let Some(budget) = self.policy.budget {
                if started.elapsed() + delay > budget {
                    tracing::warn!(
                        label,
                        attempts = state.attempt,
                        kind = %err.kind,
                        budget_ms = budget.as_millis() as u64,
                        "retry budget exhausted"
                    );
                    return Execution {
                        result: Err(err),
                        attempts: state.attempt,
                    };
                }
            }

            tracing::debug!(
                label,
                attempt = state.attempt,
                retry_in_ms = delay.as_millis() as u64,
                "backing off before retry"
            );

            if cancel.is_cancelled() {
                return Execution {
                    result: Err(UpstreamError::cancelled(label)),
                    attempts: state.attempt,
                };
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Execution {
                        result: Err(UpstreamError::cancelled(label)),
                        attempts: state.attempt,
                    };
                }
                _ = sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn failing_until(
        counter: Arc<AtomicU32>,
        failures: u32,
        kind: ErrorKind,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<&'static str, UpstreamError>> + Send>> {
        move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                let current = counter.fetch_add(1, Ordering::SeqCst);
                if current < failures {
                    Err(UpstreamError::new(kind, format!("failure {}", current + 1)))
                } else {
                    Ok("payload")
                }
            })
        }
    }

    #[tokio::test]
    async fn test_successful_operation() {
        let executor = RetryingExecutor::new(RetryPolicy::immediate(3));
        let cancel = CancellationToken::new();
        let result = executor.execute("test", || async { Ok::<_, UpstreamError>(42) }, &cancel).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_single_attempt_no_backoff() {
        let counter = Arc::new(AtomicU32::new(0));
        let executor = RetryingExecutor::new(RetryPolicy::default());
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let execution = executor
            .execute_traced(
                "test",
                failing_until(Arc::clone(&counter), u32::MAX, ErrorKind::UpstreamAuthError),
                &cancel,
            )
            .await;

        assert_eq!(execution.attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(execution.result.unwrap_err().kind, ErrorKind::UpstreamAuthError);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_twice_then_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_attempts: 5,
            ..RetryPolicy::default()
        };
        let executor = RetryingExecutor::new(policy);
        let cancel = CancellationToken::new();

        let execution = executor
            .execute_traced(
                "test",
                failing_until(Arc::clone(&counter), 2, ErrorKind::UpstreamRateLimited),
                &cancel,
            )
            .await;

        assert_eq!(execution.result.unwrap(), "payload");
        assert_eq!(execution.attempts, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let executor = RetryingExecutor::new(RetryPolicy::immediate(4));
        let cancel = CancellationToken::new();

        let execution = executor
            .execute_traced(
                "test",
                failing_until(Arc::clone(&counter), u32::MAX, ErrorKind::UpstreamServerError),
                &cancel,
            )
            .await;

        let err = execution.result.unwrap_err();
        assert_eq!(execution.attempts, 4);
        assert_eq!(err.kind, ErrorKind::UpstreamServerError);
        assert_eq!(err.message, "failure 4");
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let executor = RetryingExecutor::new(RetryPolicy::immediate(3));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let execution = executor
            .execute_traced("test", failing_until(Arc::clone(&counter), 0, ErrorKind::UpstreamUnknown), &cancel)
            .await;

        assert_eq!(execution.attempts, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(execution.result.unwrap_err().kind, ErrorKind::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retrying() {
        let counter = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_attempts: 5,
            min_wait: Duration::from_secs(5),
            max_wait: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        let executor = RetryingExecutor::new(policy);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let execution = executor
            .execute_traced(
                "test",
                failing_until(Arc::clone(&counter), u32::MAX, ErrorKind::UpstreamServerError),
                &cancel,
            )
            .await;

        assert_eq!(execution.attempts, 1);
        assert_eq!(execution.result.unwrap_err().kind, ErrorKind::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_stops_retries_early() {
        let counter = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_attempts: 10,
            multiplier: 1.0,
            min_wait: Duration::from_secs(4),
            max_wait: Duration::from_secs(4),
            budget: Some(Duration::from_secs(10)),
        };
        let executor = RetryingExecutor::new(policy);
        let cancel = CancellationToken::new();

        let execution = executor
            .execute_traced(
                "test",
                failing_until(Arc::clone(&counter), u32::MAX, ErrorKind::UpstreamUnknown),
                &cancel,
            )
            .await;

        // waits at 4s and 8s fit the budget, a third wait would end at 12s
        assert_eq!(execution.attempts, 3);
        assert_eq!(execution.result.unwrap_err().kind, ErrorKind::UpstreamUnknown);
    }

    #[tokio::test]
    async fn test_execute_with_classifier() {
        let counter = Arc::new(AtomicU32::new(0));
        let executor = RetryingExecutor::new(RetryPolicy::immediate(3));
        let cancel = CancellationToken::new();

        let calls = Arc::clone(&counter);
        let result: Result<(), UpstreamError> = executor
            .execute_with(
                "test",
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("404 not found".to_string()) }
                },
                |e: &String| {
                    if e.starts_with("404") {
                        ErrorKind::UpstreamNotFound
                    } else {
                        ErrorKind::UpstreamUnknown
                    }
                },
                &cancel,
            )
            .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::UpstreamNotFound);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_ceiling_grows_and_clamps() {
        let policy = RetryPolicy {
            multiplier: 1.0,
            min_wait: Duration::from_secs(3),
            max_wait: Duration::from_secs(10),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_ceiling(1), Duration::from_secs(3));
        assert_eq!(policy.backoff_ceiling(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_ceiling(4), Duration::from_secs(8));
        assert_eq!(policy.backoff_ceiling(5), Duration::from_secs(10));
        assert_eq!(policy.backoff_ceiling(60), Duration::from_secs(10));
    }

    #[test]
    fn test_delay_stays_inside_window() {
        let policy = RetryPolicy::default();
        for attempt in 1..8 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= policy.min_wait);
            assert!(delay <= policy.backoff_ceiling(attempt));
        }
    }
}
