//! Retry decisions for pipeline steps.
//!
//! A failed scrape or model call is retried on a fixed escalating schedule:
//! 30 seconds, 2 minutes, 5 minutes. The failure of the attempt after the
//! last scheduled delay is terminal. Permanent errors are terminal on the
//! first attempt.

use std::time::Duration;

use crate::kernel::ErrorClass;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_DELAYS: [Duration; 3] = [
    Duration::from_secs(30),
    Duration::from_secs(120),
    Duration::from_secs(300),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    pub fn retry_after(delay: Duration) -> Self {
        Self {
            should_retry: true,
            delay,
        }
    }

    pub fn give_up() -> Self {
        Self {
            should_retry: false,
            delay: Duration::ZERO,
        }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay.as_millis() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before retry `n` is `delays[n - 1]`; the last entry repeats if
    /// `max_retries` exceeds the table.
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delays: DEFAULT_DELAYS.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after attempt number `attempt` (1-based) failed.
    pub fn decide(&self, attempt: u32, class: ErrorClass) -> RetryDecision {
        if class == ErrorClass::Permanent {
            return RetryDecision::give_up();
        }
        let attempt = attempt.max(1);
        if attempt > self.max_retries {
            return RetryDecision::give_up();
        }
        let index = (attempt as usize - 1).min(self.delays.len().saturating_sub(1));
        match self.delays.get(index) {
            Some(delay) => RetryDecision::retry_after(*delay),
            None => RetryDecision::give_up(),
        }
    }
}
