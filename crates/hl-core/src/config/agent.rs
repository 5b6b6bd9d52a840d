//! Agent configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::reconnect::ReconnectPolicy;
use super::report::ReportToggles;
use super::serde_utils::duration_secs_f64;
use crate::endpoints::Endpoints;
use crate::error::ConfigError;

/// Configuration for the agent.
///
/// Built once at startup (file + command-line overrides) and shared
/// read-only with every component afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Control plane base URL (`http://` or `https://`)
    pub endpoint: String,

    /// Authentication token appended to every request
    pub token: String,

    /// Period between telemetry reports (never below one second)
    #[serde(with = "duration_secs_f64")]
    pub report_interval: Duration,

    /// Reconnection attempts after the first failed handshake
    pub max_retries: u32,

    /// Delay between reconnection attempts
    #[serde(with = "duration_secs_f64")]
    pub reconnect_interval: Duration,

    /// Bound on each transport handshake
    #[serde(with = "duration_secs_f64")]
    pub handshake_timeout: Duration,

    /// Bound on each report write
    #[serde(with = "duration_secs_f64")]
    pub write_timeout: Duration,

    /// While degraded, how often to try the transport again
    #[serde(with = "duration_secs_f64")]
    pub degraded_reconnect_interval: Duration,

    /// Delay between task result upload attempts
    #[serde(with = "duration_secs_f64")]
    pub task_retry_delay: Duration,

    /// Default timeout for network probes
    #[serde(with = "duration_secs_f64")]
    pub probe_timeout: Duration,

    /// Period between host basic info uploads
    #[serde(with = "duration_secs_f64")]
    pub info_report_interval: Duration,

    /// Reject remote command execution (terminals are unaffected)
    pub disable_web_ssh: bool,

    /// Preferred interactive shell for terminals
    pub default_shell: Option<String>,

    /// Extra environment variables for terminal shells
    pub default_env: Vec<(String, String)>,

    /// Which telemetry sections to collect
    pub report: ReportToggles,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: String::new(),
            report_interval: Duration::from_secs_f64(1.1),
            max_retries: 3,
            reconnect_interval: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            degraded_reconnect_interval: Duration::from_secs(60),
            task_retry_delay: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(3),
            info_report_interval: Duration::from_secs(300),
            disable_web_ssh: false,
            default_shell: None,
            default_env: vec![],
            report: ReportToggles::default(),
        }
    }
}

impl AgentConfig {
    /// Check required fields and derive the control plane URLs
    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField("endpoint".to_string()));
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingField("token".to_string()));
        }
        Endpoints::new(&self.endpoint, &self.token)
    }

    /// Reconnect/report timing read by the connection manager
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.max_retries,
            self.reconnect_interval,
            self.report_interval,
        )
    }
}
