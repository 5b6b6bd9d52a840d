//! Core trait definitions

mod telemetry;
mod uplink;

pub use telemetry::TelemetryProvider;
pub use uplink::Uplink;
