//! Retry policy for scheduled fetches.

use std::time::Duration;

/// Default maximum attempts (including the initial attempt).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between attempts, in milliseconds.
///
/// The same fixed delay paces dispatch and retries: the goal is to
/// smooth bursty submission toward rate-limited backends, not to back
/// off exponentially.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 120;

/// How a fetch handles transient failures.
///
/// Only the rate-limit / server-busy error class is retried; permanent
/// errors surface to the caller immediately regardless of policy.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// No retries - fail on the first error.
    None,

    /// Fixed number of attempts with a constant delay between them.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Fixed {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Creates a fixed retry policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Delay before the retry following `attempt` (1-based), or `None`
    /// when no more retries are allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => {
                if attempt < *max_attempts {
                    Some(*delay)
                } else {
                    None
                }
            }
        }
    }

    /// Maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => *max_attempts,
        }
    }
}
