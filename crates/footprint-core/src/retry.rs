//! Fixed-wait retry for network operations

use std::time::Duration;

use indicatif::ProgressBar;

/// Errors that know whether another attempt could succeed
pub trait Retryable: std::fmt::Display {
    fn is_retryable(&self) -> bool;
}

/// Attempt ceiling and constant pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included
    pub attempts: u32,
    pub wait: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, wait: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            wait,
        }
    }
}

/// Retry a fallible network operation with a fixed wait between attempts.
///
/// Retryable errors are logged and retried until `policy.attempts` tries
/// have been made. Returns the first success, or the last error once
/// attempts are exhausted or the error is not retryable.
pub fn retry_fixed<T, E: Retryable>(
    label: &str,
    policy: RetryPolicy,
    pb: &ProgressBar,
    mut attempt_fn: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let mut attempt = 1u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.attempts && e.is_retryable() => {
                pb.set_message(format!("retry {attempt}/{}...", policy.attempts - 1));
                log::warn!(
                    "{label}: attempt {attempt}/{} failed: {e}, retrying in {:?}",
                    policy.attempts,
                    policy.wait
                );
                std::thread::sleep(policy.wait);
                attempt += 1;
            }
            Err(e) => {
                log::error!("{label}: failed after {attempt} attempt(s): {e}");
                return Err(e);
            }
        }
    }
}
