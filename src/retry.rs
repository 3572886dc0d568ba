//! Shared retry policy (spec.md §4.1, §9 "Retry + deadline composition"):
//! exponential backoff starting at 5s, doubling, capped at 64s, with 0-10s
//! of uniform jitter layered on top, up to 3 attempts total.
//!
//! Used by both the Git Adapter's network operations (clone, fetch) and
//! the Hook Runner's per-hook retries, so the policy lives here once
//! instead of being copy-pasted into each caller.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use rand::Rng;

const MAX_ATTEMPTS: u32 = 3;

/// Implemented by error types that distinguish retryable failures from
/// ones that should abort immediately — e.g. a hook timeout, which spec.md
/// §9 says is "not retried" even though a non-zero exit from the same hook
/// would be.
pub trait RetryableError {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Retries `attempt_fn` under the shared backoff policy. Stops early,
/// without sleeping, the moment an error reports `is_retryable() == false`.
pub fn with_retry<T, E>(op: &str, mut attempt_fn: impl FnMut() -> Result<T, E>) -> Result<T, E>
where
    E: RetryableError + std::fmt::Display,
{
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_secs(5))
        .with_multiplier(2.0)
        .with_max_interval(Duration::from_secs(64))
        .with_max_elapsed_time(None)
        .build();

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match attempt_fn() {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => {
                tracing::warn!(op, attempt, %err, "non-retryable failure, aborting");
                return Err(err);
            }
            Err(err) if attempt >= MAX_ATTEMPTS => {
                tracing::error!(op, attempt, %err, "exhausted retries");
                return Err(err);
            }
            Err(err) => {
                let delay = backoff.next_backoff().unwrap_or(Duration::from_secs(64));
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..10_000));
                tracing::warn!(op, attempt, %err, delay_ms = (delay + jitter).as_millis() as u64, "retrying");
                std::thread::sleep(delay + jitter);
            }
        }
    }
}
