//! Telemetry report payloads
//!
//! Every section is optional: the agent only includes what its report
//! toggles enable. `message` is always present and carries non-fatal
//! collection warnings (empty when there were none).

use serde::{Deserialize, Serialize};

/// CPU utilisation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuUsage {
    /// Global usage percentage (0-100)
    pub usage: f64,
}

/// Used/total pair in bytes (RAM, swap, disk)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capacity {
    pub total: u64,
    pub used: u64,
}

/// Load averages
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadAverage {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

/// Network throughput (bytes/s) and lifetime totals (bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkUsage {
    pub up: u64,
    pub down: u64,
    #[serde(rename = "totalUp")]
    pub total_up: u64,
    #[serde(rename = "totalDown")]
    pub total_down: u64,
}

/// Open socket counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Connections {
    pub tcp: u64,
    pub udp: u64,
}

/// One telemetry snapshot, sent as a JSON text frame each report tick
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<Capacity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap: Option<Capacity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadAverage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<Capacity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<Connections>,
    /// Seconds since boot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    /// Number of running processes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<u64>,
    /// Collection warnings, newline separated
    #[serde(default)]
    pub message: String,
}

impl Report {
    /// Append a collection warning to `message`
    pub fn warn(&mut self, warning: impl AsRef<str>) {
        self.message.push_str(warning.as_ref());
        self.message.push('\n');
    }
}

/// Static host description uploaded on connect and periodically
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BasicInfo {
    pub cpu_name: String,
    pub cpu_cores: u64,
    pub arch: String,
    pub os: String,
    /// Left out of the payload when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kernel_version: String,
    pub mem_total: u64,
    pub swap_total: u64,
    pub disk_total: u64,
    /// Agent version
    pub version: String,
}

impl BasicInfo {
    /// Copy without the kernel version, for control planes that predate it
    pub fn without_kernel_version(&self) -> Self {
        Self {
            kernel_version: String::new(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_info_without_kernel_version_omits_key() {
        let info = BasicInfo {
            os: "linux".into(),
            kernel_version: "6.1.0".into(),
            ..Default::default()
        };
        let full = serde_json::to_value(&info).unwrap();
        assert_eq!(full["kernel_version"], "6.1.0");

        let legacy = serde_json::to_value(info.without_kernel_version()).unwrap();
        assert!(legacy.get("kernel_version").is_none());
        assert_eq!(legacy["os"], "linux");
    }

    #[test]
    fn test_report_omits_disabled_sections() {
        let report = Report {
            cpu: Some(CpuUsage { usage: 10.0 }),
            ram: Some(Capacity {
                total: 100,
                used: 50,
            }),
            ..Default::default()
        };
        let value = serde_json::to_value(&report).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(value["cpu"]["usage"].as_f64(), Some(10.0));
        assert_eq!(value["ram"]["total"], 100);
        assert_eq!(value["ram"]["used"], 50);
        assert_eq!(value["message"], "");
        assert!(!object.contains_key("swap"));
        assert!(!object.contains_key("uptime"));
    }

    #[test]
    fn test_network_uses_camel_case_totals() {
        let report = Report {
            network: Some(NetworkUsage {
                up: 1,
                down: 2,
                total_up: 3,
                total_down: 4,
            }),
            ..Default::default()
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["network"]["totalUp"], 3);
        assert_eq!(value["network"]["totalDown"], 4);
    }

    #[test]
    fn test_warn_accumulates_lines() {
        let mut report = Report::default();
        report.warn("failed to get uptime");
        report.warn("failed to get connections");
        assert_eq!(
            report.message,
            "failed to get uptime\nfailed to get connections\n"
        );
    }
}
