//! Core domain types

use std::fmt;

/// Lifecycle state of the report transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; the next tick will start connecting
    Disconnected,
    /// Handshake in progress (including retry sleeps)
    Connecting,
    /// Transport open; reports flow over it
    Connected,
    /// Reconnection exhausted; reports go out as one-shot HTTP posts
    Degraded,
}

impl ConnectionState {
    /// Whether reports currently flow over the transport
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Degraded => write!(f, "degraded"),
        }
    }
}
