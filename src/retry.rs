//! Retry policy, plus small helpers for [`keen_retry`]'s retry API.

use std::{fmt, iter, time::Duration};

use keen_retry::RetryResult;

/// On error, return a [`RetryResult::Transient`] value.
macro_rules! try_transient {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(error) => {
                debug!("Transient error: {}", error);
                return ::keen_retry::RetryResult::Transient {
                    input: (),
                    error: From::from(error),
                };
            }
        }
    };
}

// Export the macro within the crate as if it were a normal symbol.
pub(crate) use try_transient;

/// Build an [`RetryResult::Ok`] value.
pub(crate) fn retry_result_ok<T, E>(output: T) -> RetryResult<(), (), T, E> {
    RetryResult::Ok {
        reported_input: (),
        output,
    }
}

/// How often to retry a failed request, and how long to wait in between.
///
/// The remote service answers rate limiting with an error body instead of a
/// `Retry-After` header, so we just wait a fixed time and try again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero means "try exactly once".
    pub retries: usize,

    /// How long to wait before each retry.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(retries: usize, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Maximum number of attempts, including the first.
    pub fn max_attempts(&self) -> usize {
        self.retries + 1
    }

    /// The delays before each retry, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        iter::repeat_n(self.delay, self.retries)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(5))
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} retries, {:.1}s apart",
            self.retries,
            self.delay.as_secs_f64()
        )
    }
}
