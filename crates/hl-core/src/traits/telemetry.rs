//! Telemetry provider trait

use hl_protocol::{BasicInfo, Report};

/// Source of host metrics.
///
/// Implementations may block briefly (they typically read `/proc` or call
/// into the OS); callers run them off the async executor.
pub trait TelemetryProvider: Send + Sync {
    /// Take one telemetry snapshot
    fn snapshot(&self) -> Report;

    /// Describe the host; called on connect and periodically
    fn basic_info(&self) -> BasicInfo {
        BasicInfo {
            arch: std::env::consts::ARCH.to_string(),
            os: std::env::consts::OS.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedTelemetry;

    #[test]
    fn test_default_basic_info() {
        let info = FixedTelemetry::default().basic_info();
        assert_eq!(info.os, std::env::consts::OS);
        assert!(!info.version.is_empty());
    }
}
