use std::cmp::min;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Run `task` until it succeeds or the policy's attempts are used up.
///
/// Each attempt is bounded by `timeout_ms`; the delay between attempts starts
/// at `base_delay_ms` and doubles up to `max_delay_ms`. The error of the last
/// attempt is returned unchanged so callers can report it verbatim.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: std::future::Future<Output = Result<P>>,
{
    let attempts = policy.max_retries.max(1);
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let mut delay = Duration::from_millis(policy.base_delay_ms);

    let mut attempt = 0;
    loop {
        attempt += 1;
        let e = match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(error)) => {
                warn!(attempt, "task failed with error: {:?}", &error);
                error
            }
            Err(_) => {
                warn!(attempt, "task timed out after {:?}", timeout_duration);
                Error::RetryTimeout(timeout_duration)
            }
        };

        if attempt >= attempts {
            return Err(e);
        }

        sleep(delay).await;
        delay = min(delay * 2, max_delay);
    }
}
