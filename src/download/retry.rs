//! Bounded retry with a fixed backoff delay.
//!
//! When an attempt fails, the manager asks the [`RetryPolicy`] whether the
//! job has budget left. Each job gets `max_retries` re-attempts after its first
//! attempt, so a job that never succeeds is tried `max_retries + 1` times in
//! total. The delay between attempts is constant; the budget is small enough
//! that exponential growth buys nothing.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use transfer_deck::download::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(2));
//!
//! match policy.decide(0) {
//!     RetryDecision::Retry { attempt, delay } => {
//!         println!("retry {attempt}/3 in {delay:?}");
//!     }
//!     RetryDecision::GiveUp => println!("out of retries"),
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::constants::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`.
    Retry {
        /// Retry number this will be (1-indexed, so the first retry is 1).
        attempt: u32,
        /// How long to wait before the next attempt.
        delay: Duration,
    },

    /// Budget exhausted; the job fails.
    GiveUp,
}

/// Retry budget and delay.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `delay`: 2 seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-attempts allowed after the first attempt.
    max_retries: u32,

    /// Fixed wait before each re-attempt.
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with an explicit budget and delay.
    #[must_use]
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Returns the retry budget.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the fixed backoff delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decides what happens after a failed attempt.
    ///
    /// `retries_used` is the number of re-attempts the job has already made.
    #[instrument(skip(self), fields(max_retries = self.max_retries))]
    pub fn decide(&self, retries_used: u32) -> RetryDecision {
        if retries_used >= self.max_retries {
            debug!(retries_used, "retry budget exhausted");
            return RetryDecision::GiveUp;
        }

        let attempt = retries_used + 1;
        debug!(attempt, delay_ms = self.delay.as_millis(), "will retry");
        RetryDecision::Retry {
            attempt,
            delay: self.delay,
        }
    }
}
