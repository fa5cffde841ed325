//! Bounded retry combinator for decision-service calls that may return
//! transiently unusable output.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Retry bound and backoff between attempts. Both come from configuration.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Run `op` until it yields a value, it fails, the attempt bound is reached,
/// or the token fires. `Ok(None)` from `op` means "transiently unusable,
/// try again"; hard errors propagate immediately.
pub async fn bounded<T, E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    for attempt in 0..policy.attempts.max(1) {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        if let Some(value) = op().await? {
            return Ok(Some(value));
        }
        let last = attempt + 1 == policy.attempts.max(1);
        if !last && !policy.backoff.is_zero() {
            tokio::time::sleep(policy.backoff).await;
        }
    }
    Ok(None)
}
