//! Retry policy with linear backoff.
//!
//! Retry `n` (1-indexed) waits `base_delay × n`, so `max_attempts = 3` with a
//! one second base waits 1s, 2s, then 3s before giving up.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::TaskflowError;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries allowed after the initial attempt.
    #[serde(default)]
    pub max_attempts: u32,
    /// Base delay between retries in milliseconds.
    #[serde(default)]
    pub base_delay_ms: u64,
}

impl RetryConfig {
    /// Creates a retry config.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    /// Never retry.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    /// Five retries with a three second base delay.
    #[must_use]
    pub const fn standard() -> Self {
        Self::new(5, 3000)
    }

    /// Sets the number of retries.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Returns the base delay as a duration.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay in milliseconds before retry number `attempt` (1-indexed).
    #[must_use]
    pub const fn delay_ms_for(&self, attempt: u32) -> u64 {
        self.base_delay_ms.saturating_mul(attempt as u64)
    }

    /// Delay before retry number `attempt` (1-indexed).
    #[must_use]
    pub const fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms_for(attempt))
    }

    /// Decides whether another retry is allowed after `retries_so_far` retries.
    ///
    /// Returns the delay to wait before the retry, or `None` once exhausted.
    #[must_use]
    pub const fn next_retry(&self, retries_so_far: u32) -> Option<Duration> {
        if retries_so_far < self.max_attempts {
            Some(self.delay_for(retries_so_far + 1))
        } else {
            None
        }
    }

    /// Every backoff delay in order, one per allowed retry.
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts).map(|n| self.delay_for(n)).collect()
    }

    /// Checks that the longest backoff is representable.
    pub fn validate(&self) -> Result<(), TaskflowError> {
        if self
            .base_delay_ms
            .checked_mul(self.max_attempts as u64)
            .is_none()
        {
            return Err(TaskflowError::InvalidRetryConfig {
                max_attempts: self.max_attempts,
                base_delay_ms: self.base_delay_ms,
            });
        }
        Ok(())
    }
}
