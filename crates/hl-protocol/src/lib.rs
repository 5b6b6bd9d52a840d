//! hl-protocol: Wire messages for the hostlink agent
//!
//! This crate defines the JSON messages exchanged between the agent and its
//! control plane, and the frame type carried by every transport.

pub mod envelope;
pub mod error;
pub mod frame;
pub mod ids;
pub mod message;
pub mod report;

pub use envelope::Envelope;
pub use error::ProtocolError;
pub use frame::Frame;
pub use ids::{RequestId, TaskId};
pub use message::{ProbeKind, ProbeResult, TaskResult, TerminalControl, TerminalSize};
pub use report::{BasicInfo, Report};
