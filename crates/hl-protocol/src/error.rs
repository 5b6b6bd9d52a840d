//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding or encoding protocol messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Payload was not valid JSON for the expected shape
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Probe kind not recognised
    #[error("Unsupported probe type: {0}")]
    UnsupportedProbe(String),
}
