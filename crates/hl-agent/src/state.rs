//! Agent state management

use std::sync::Arc;

use hl_core::config::AgentConfig;
use hl_core::traits::{TelemetryProvider, Uplink};
use hl_core::{Endpoints, HlError};

use crate::metrics::SysinfoTelemetry;
use crate::probe::{Resolver, SystemResolver};
use crate::terminal::{NativePty, PtyBackend, TerminalRegistry};
use crate::transport::{Dialer, WsDialer};
use crate::uplink::HttpUplink;

/// State shared by the connection manager and every request handler.
///
/// The collaborators are trait objects so that tests can swap in in-memory
/// transports, fixed telemetry and recording uplinks.
pub struct AgentState {
    /// Configuration
    pub config: AgentConfig,
    /// Control plane URLs
    pub endpoints: Endpoints,
    /// Host metrics source
    pub telemetry: Arc<dyn TelemetryProvider>,
    /// One-shot HTTP deliveries
    pub uplink: Arc<dyn Uplink>,
    /// Opens report and terminal transports
    pub dialer: Arc<dyn Dialer>,
    /// Spawns terminal shells
    pub pty: Arc<dyn PtyBackend>,
    /// Name resolution for probes
    pub resolver: Arc<dyn Resolver>,
    /// Open terminal sessions
    pub terminals: TerminalRegistry,
}

impl AgentState {
    /// Create state backed by the real system, network and PTY
    pub fn new(config: AgentConfig) -> Result<Self, HlError> {
        let endpoints = config.endpoints()?;
        let uplink = HttpUplink::new(endpoints.clone(), config.write_timeout)?;

        Ok(Self {
            telemetry: Arc::new(SysinfoTelemetry::new(config.report)),
            uplink: Arc::new(uplink),
            dialer: Arc::new(WsDialer::new(config.handshake_timeout)),
            pty: Arc::new(NativePty),
            resolver: Arc::new(SystemResolver),
            terminals: TerminalRegistry::new(),
            endpoints,
            config,
        })
    }

    /// Replace the telemetry source
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryProvider>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Replace the HTTP uplink
    pub fn with_uplink(mut self, uplink: Arc<dyn Uplink>) -> Self {
        self.uplink = uplink;
        self
    }

    /// Replace the transport dialer
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Replace the PTY backend
    pub fn with_pty(mut self, pty: Arc<dyn PtyBackend>) -> Self {
        self.pty = pty;
        self
    }

    /// Replace the probe resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_missing_endpoint() {
        let config = AgentConfig {
            token: "tok".into(),
            ..AgentConfig::default()
        };
        assert!(matches!(AgentState::new(config), Err(HlError::Config(_))));
    }

    #[test]
    fn test_builds_from_valid_config() {
        let config = AgentConfig {
            endpoint: "https://panel.example.com".into(),
            token: "tok".into(),
            ..AgentConfig::default()
        };
        let state = AgentState::new(config).unwrap();
        assert!(state.terminals.is_empty());
        assert_eq!(state.endpoints.report_ws().scheme(), "wss");
    }
}
