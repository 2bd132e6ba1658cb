//! Exponential backoff for transient failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// Attempt budget and base delay for [`retry`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of invocations.
    pub attempts: u32,
    /// Delay unit; the wait after failed attempt `i` is `base_delay * 2^i`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Builds a policy with a one second delay unit.
    #[must_use]
    pub const fn new(attempts: u32) -> Self {
        Self {
            attempts,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Overrides the delay unit.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Wait applied after the zero-based attempt `index` fails.
    #[must_use]
    pub fn backoff(&self, index: u32) -> Duration {
        let factor = 2_u32.checked_pow(index).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Errors returned by [`retry`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RetryError<E> {
    /// The policy allowed zero attempts, so the action never ran.
    #[error("retry policy allows no attempts")]
    NoAttempts,
    /// Every attempt failed; only the final failure is kept.
    #[error("failed after {attempts} attempts: {source}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: E,
    },
}

/// Runs `action` until it succeeds or the attempt budget is spent.
///
/// Every error is treated as retryable. No wait follows the final attempt.
///
/// # Errors
///
/// Returns [`RetryError::NoAttempts`] when the policy allows zero attempts
/// and [`RetryError::Exhausted`] wrapping the last failure otherwise.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, mut action: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut index = 0;
    loop {
        if index >= policy.attempts {
            return Err(RetryError::NoAttempts);
        }

        match action().await {
            Ok(value) => return Ok(value),
            Err(err) if index + 1 >= policy.attempts => {
                return Err(RetryError::Exhausted {
                    attempts: policy.attempts,
                    source: err,
                });
            }
            Err(err) => {
                let wait = policy.backoff(index);
                warn!(
                    attempt = index + 1,
                    attempts = policy.attempts,
                    wait_secs = wait.as_secs_f64(),
                    error = %err,
                    "attempt failed; retrying"
                );
                sleep(wait).await;
                index += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::cell::Cell;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_waiting_one_then_two_units() {
        let started = Instant::now();
        let calls = Cell::new(0_u32);

        let result = retry(RetryPolicy::new(3), || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move {
                if attempt < 3 {
                    Err(format!("transient {attempt}"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_keeps_only_the_last_failure() {
        let calls = Cell::new(0_u32);

        let result: Result<(), _> = retry(RetryPolicy::new(3), || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move { Err(format!("failure {attempt}")) }
        })
        .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 3,
                source: String::from("failure 3"),
            })
        );
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_never_invokes_the_action() {
        let started = Instant::now();
        let calls = Cell::new(0_u32);

        let result: Result<(), RetryError<String>> = retry(RetryPolicy::new(0), || {
            calls.set(calls.get() + 1);
            async { Ok(()) }
        })
        .await;

        assert_eq!(result, Err(RetryError::NoAttempts));
        assert_eq!(calls.get(), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(5, 32)]
    fn backoff_doubles_per_attempt(#[case] index: u32, #[case] expected_secs: u64) {
        assert_eq!(
            RetryPolicy::new(10).backoff(index),
            Duration::from_secs(expected_secs)
        );
    }

    #[rstest]
    fn exhausted_message_states_attempt_count() {
        let err = RetryError::Exhausted {
            attempts: 3,
            source: std::io::Error::other("table not active"),
        };
        assert_eq!(err.to_string(), "failed after 3 attempts: table not active");
    }
}
