//! Telemetry section toggles

use serde::{Deserialize, Serialize};

/// Which sections the telemetry provider fills in.
///
/// Disabled sections are omitted from the report entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportToggles {
    pub cpu: bool,
    pub ram: bool,
    pub swap: bool,
    pub load: bool,
    pub disk: bool,
    pub network: bool,
    pub connections: bool,
    pub uptime: bool,
    pub process: bool,
}

impl Default for ReportToggles {
    fn default() -> Self {
        Self::all()
    }
}

impl ReportToggles {
    /// Every section enabled
    pub fn all() -> Self {
        Self {
            cpu: true,
            ram: true,
            swap: true,
            load: true,
            disk: true,
            network: true,
            connections: true,
            uptime: true,
            process: true,
        }
    }

    /// Every section disabled
    pub fn none() -> Self {
        Self {
            cpu: false,
            ram: false,
            swap: false,
            load: false,
            disk: false,
            network: false,
            connections: false,
            uptime: false,
            process: false,
        }
    }
}
