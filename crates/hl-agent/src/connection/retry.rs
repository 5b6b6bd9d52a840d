//! Fixed-interval retry budget for reconnection

use std::time::Duration;

use hl_core::config::ReconnectPolicy;

/// Counts down the retries left in one connecting cycle.
///
/// A cycle makes at most `max_retries + 1` handshake attempts with a fixed
/// sleep between consecutive attempts and none after the last.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    /// Retries left after the current attempt
    remaining: u32,
    /// Delay before each retry
    interval: Duration,
}

impl RetryBudget {
    /// Create a budget from the reconnection policy
    pub fn from_policy(policy: &ReconnectPolicy) -> Self {
        Self::new(policy.max_retries, policy.reconnect_interval)
    }

    /// Create a budget with explicit parameters
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            remaining: max_retries,
            interval,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.interval)
    }

    /// Retries still available
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}
