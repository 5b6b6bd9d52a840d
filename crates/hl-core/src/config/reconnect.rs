//! Reconnection and reporting cadence

use std::time::Duration;

/// Shortest allowed report period
pub const MIN_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Fixed-interval reconnection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts allowed after the first failed handshake
    pub max_retries: u32,
    /// Delay between attempts
    pub reconnect_interval: Duration,
    /// Requested report period
    pub report_interval: Duration,
}

impl ReconnectPolicy {
    /// Create a new policy
    pub fn new(max_retries: u32, reconnect_interval: Duration, report_interval: Duration) -> Self {
        Self {
            max_retries,
            reconnect_interval,
            report_interval,
        }
    }

    /// Report timer period, floored at one second
    pub fn tick_period(&self) -> Duration {
        self.report_interval.max(MIN_REPORT_INTERVAL)
    }

    /// Total handshake attempts in one connecting cycle
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Time spent sleeping between attempts in one exhausted cycle,
    /// excluding the handshakes themselves
    pub fn worst_case_backoff(&self) -> Duration {
        self.reconnect_interval * self.max_retries
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            reconnect_interval: Duration::from_secs(5),
            report_interval: Duration::from_secs_f64(1.1),
        }
    }
}
