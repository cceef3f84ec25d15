// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Retry and polling policies.
//!
//! The device session consults a [`RetryPolicy`] after every failed exchange;
//! the monitor loop paces its refreshes with a [`PollingPolicy`].

use std::time::Duration;

use crate::psu::response::PsuError;

/// Policy for retrying failed exchanges.
pub trait RetryPolicy: Send + Sync {
    /// Determine if the exchange should be retried after `attempts` tries.
    fn should_retry(&self, attempts: u32, error: &PsuError) -> bool;

    /// Get the delay before the next retry attempt.
    fn delay(&self, attempt: u32) -> Duration;

    /// Get the maximum number of attempts allowed.
    fn max_attempts(&self) -> u32;
}

/// Fixed delay retry policy.
///
/// Uses a constant delay between retry attempts.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    max_attempts: u32,
    delay: Duration,
}

impl FixedDelay {
    /// Create a new fixed delay policy.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// One try plus `retries` re-sends.
    pub fn with_retries(retries: u32, delay: Duration) -> Self {
        Self::new(retries.saturating_add(1), delay)
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::with_retries(1, Duration::ZERO)
    }
}

impl RetryPolicy for FixedDelay {
    fn should_retry(&self, attempts: u32, error: &PsuError) -> bool {
        attempts < self.max_attempts && error.is_transient()
    }

    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// No retry policy - exchanges fail on the first error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&self, _attempts: u32, _error: &PsuError) -> bool {
        false
    }

    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }

    fn max_attempts(&self) -> u32 {
        1
    }
}

/// Policy for polling the supply for fresh readings.
pub trait PollingPolicy: Send + Sync {
    /// Get the interval between polls.
    fn interval(&self) -> Duration;
}

/// Fixed polling policy.
///
/// Uses a constant interval regardless of device state.
#[derive(Debug, Clone)]
pub struct FixedPolling {
    interval: Duration,
}

impl FixedPolling {
    /// Create a new fixed polling policy.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedPolling {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl PollingPolicy for FixedPolling {
    fn interval(&self) -> Duration {
        self.interval
    }
}
