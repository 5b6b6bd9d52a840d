//! hl-core: Core abstractions and configuration for hostlink
//!
//! This crate provides the configuration, error types, control plane URLs
//! and the narrow traits (telemetry, HTTP uplink) the agent is built on.

pub mod config;
pub mod endpoints;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod traits;
pub mod types;

pub use endpoints::Endpoints;
pub use error::HlError;
pub use types::ConnectionState;
