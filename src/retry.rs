//! Retry with exponential backoff for external API calls

use std::future::Future;
use std::time::{Duration, SystemTime};

/// Retry policy for a remote operation
///
/// Controls how many times a failed call is attempted and how long to
/// wait between attempts using exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Base delay between attempts (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with explicit bounds
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Compute the delay before the next attempt.
///
/// The delay follows exponential backoff: `min(base_delay * 2^attempt +
/// jitter, max_delay)`. Jitter is 0-25% of the computed delay, derived
/// from `SystemTime` to avoid pulling in a full random number generator.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    let base = base.min(policy.max_delay);

    // Derive a simple jitter from subsecond nanos of the system clock
    let jitter_nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    // Scale to 0-25% of the base delay
    let jitter_fraction = f64::from(jitter_nanos % 250) / 1000.0;
    let jitter = base.mul_f64(jitter_fraction);

    (base + jitter).min(policy.max_delay)
}

/// Run `op` under the given retry policy.
///
/// `op` is invoked up to `policy.max_attempts` times. An error for which
/// `is_fatal` returns true is surfaced immediately with no backoff sleep;
/// any other error is retried after an exponential delay. The last error
/// is returned once attempts are exhausted.
///
/// # Errors
///
/// Returns the first fatal error, or the last transient error after
/// exhausting all attempts.
pub async fn run<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_fatal: impl Fn(&E) -> bool,
    mut op: F,
) -> std::result::Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(e);
                }

                let delay = delay_for_attempt(policy, attempt - 1);
                tracing::debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
