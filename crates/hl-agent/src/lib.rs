//! hl-agent: Host monitoring and remote control agent for hostlink
//!
//! The agent keeps one outbound report transport to the control plane,
//! streams telemetry over it on a fixed timer, and answers the requests the
//! control plane sends back: interactive terminals, one-shot commands and
//! reachability probes. When the transport cannot be kept up, reports fall
//! back to plain HTTP posts.

pub mod connection;
pub mod dispatch;
pub mod metrics;
pub mod probe;
pub mod state;
pub mod task;
pub mod terminal;
pub mod transport;
pub mod uplink;

pub use connection::ConnectionManager;
pub use state::AgentState;
