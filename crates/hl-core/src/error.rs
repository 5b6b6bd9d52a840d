//! Core error types for hostlink

use hl_protocol::ProtocolError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the hostlink agent
#[derive(Error, Debug)]
pub enum HlError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Upload error
    #[error("Upload error: {0}")]
    Uplink(#[from] UplinkError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport-level errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Handshake did not finish in time
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Handshake was refused or failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Transport already closed
    #[error("Connection closed")]
    Closed,

    /// Write failed
    #[error("Send failed: {0}")]
    Send(String),

    /// Write did not finish in time
    #[error("Send timed out after {0:?}")]
    SendTimeout(Duration),

    /// Read failed
    #[error("Receive failed: {0}")]
    Receive(String),

    /// Frame could not be encoded
    #[error("Encode failed: {0}")]
    Encode(#[from] ProtocolError),
}

/// Terminal session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// No usable interactive shell on this host
    #[error("No supported shell found.")]
    NoShell,

    /// PTY allocation failed
    #[error("PTY allocation failed: {0}")]
    PtyAllocation(String),

    /// Shell could not be started
    #[error("Failed to spawn shell: {0}")]
    Spawn(String),

    /// PTY I/O failed
    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// PTY reached end of file
    #[error("Terminal closed")]
    Closed,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// HTTP upload errors
#[derive(Error, Debug)]
pub enum UplinkError {
    /// Request could not be sent or no response arrived
    #[error("Request failed: {0}")]
    Request(String),

    /// Control plane answered with a non-success status
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}
