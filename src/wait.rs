//! Readiness polling for resources whose creation completes asynchronously.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};

/// Timeout and spacing applied while polling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Budget measured from the first check.
    pub timeout: Duration,
    /// Sleep between consecutive checks.
    pub interval: Duration,
}

impl PollPolicy {
    /// Builds a policy from a timeout and an interval.
    #[must_use]
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Errors returned by [`poll_until`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PollError<E> {
    /// The condition never reported ready within the budget.
    #[error("timed out after {timeout:?} waiting for readiness")]
    Timeout {
        /// Configured timeout.
        timeout: Duration,
    },
    /// The condition itself failed; polling stops at the first failure.
    #[error("readiness check failed: {0}")]
    Condition(#[source] E),
}

/// Evaluates `condition` until it reports `true`, fails, or the deadline
/// passes.
///
/// The first check runs immediately. Checks are spaced by the full interval
/// regardless of how long the condition took, so the total wall time may
/// exceed the timeout by one interval plus the condition latency.
///
/// # Errors
///
/// Returns [`PollError::Condition`] as soon as the condition fails and
/// [`PollError::Timeout`] once the deadline has passed without a ready
/// result.
pub async fn poll_until<F, Fut, E>(policy: PollPolicy, mut condition: F) -> Result<(), PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let deadline = Instant::now() + policy.timeout;
    while Instant::now() < deadline {
        if condition().await.map_err(PollError::Condition)? {
            return Ok(());
        }
        sleep(policy.interval).await;
    }

    Err(PollError::Timeout {
        timeout: policy.timeout,
    })
}
