//! Per-resource retry state for periodic refreshes
//!
//! A failed refresh switches the resource to a short retry interval. After
//! `max_failures` consecutive failures the resource gives up: the counter
//! resets and it goes back to its normal interval, keeping its stale data.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_interval: Duration,
    pub max_failures: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(30),
            max_failures: 3,
        }
    }
}

/// Where a resource ended up after recording an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPhase {
    Fresh,
    Retrying { failures: u32 },
    GivenUp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    failures: u32,
    retry_mode: bool,
}

impl RetryState {
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn in_retry_mode(&self) -> bool {
        self.retry_mode
    }

    pub fn record_success(&mut self) -> RetryPhase {
        *self = Self::default();
        RetryPhase::Fresh
    }

    pub fn record_failure(&mut self, policy: &RetryPolicy) -> RetryPhase {
        self.failures += 1;
        if self.failures >= policy.max_failures {
            self.failures = 0;
            self.retry_mode = false;
            RetryPhase::GivenUp
        } else {
            self.retry_mode = true;
            RetryPhase::Retrying {
                failures: self.failures,
            }
        }
    }

    /// Time to wait after an attempt before the next one.
    pub fn wait_after_attempt(&self, interval: Duration, policy: &RetryPolicy) -> Duration {
        if self.retry_mode {
            policy.retry_interval
        } else {
            interval
        }
    }

    /// Never-attempted resources are always due.
    pub fn is_due(
        &self,
        last_attempt: Option<Instant>,
        interval: Duration,
        policy: &RetryPolicy,
        now: Instant,
    ) -> bool {
        match last_attempt {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.wait_after_attempt(interval, policy),
        }
    }
}
