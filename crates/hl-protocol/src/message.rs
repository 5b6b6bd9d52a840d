//! Outbound results and terminal control messages
//!
//! # Message Flow
//!
//! 1. Agent opens the report transport and sends a `Report` every tick
//! 2. Control plane pushes an inbound envelope (see `envelope.rs`)
//! 3. Exec requests answer with a `TaskResult` over HTTP
//! 4. Ping requests answer with a `ProbeResult` over the report transport
//! 5. Terminal requests open a dedicated transport carrying
//!    `TerminalControl` text frames inbound and raw bytes both ways

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::ids::TaskId;

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of rows
    pub rows: u16,
    /// Number of columns
    pub cols: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Default terminal size (24x80)
    pub fn default_size() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::default_size()
    }
}

/// Structured control message received on a terminal transport.
///
/// Text frames that are not JSON objects are raw input for the
/// pseudo-terminal. Objects are always consumed as control messages, even
/// when their type is unknown or their fields are unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalControl {
    /// Resize the pseudo-terminal
    Resize { cols: u16, rows: u16 },
    /// Write text to the pseudo-terminal
    Input { input: String },
    /// Well-formed message with nothing to do
    Ignore,
}

/// Loose wire shape of a control message
#[derive(Deserialize)]
struct WireControl {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    cols: i64,
    #[serde(default)]
    rows: i64,
    #[serde(default)]
    input: String,
}

impl TerminalControl {
    /// Decode a text payload as a control message.
    ///
    /// Returns `None` only when the payload is not a JSON control object, in
    /// which case the caller should write it to the terminal verbatim.
    pub fn parse(text: &str) -> Option<Self> {
        let fields: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(text).ok()?;
        let wire: WireControl = serde_json::from_value(serde_json::Value::Object(fields)).ok()?;

        let control = match wire.kind.as_str() {
            "resize" => match (dimension(wire.cols), dimension(wire.rows)) {
                (Some(cols), Some(rows)) => Self::Resize { cols, rows },
                _ => Self::Ignore,
            },
            "input" if !wire.input.is_empty() => Self::Input { input: wire.input },
            _ => Self::Ignore,
        };
        Some(control)
    }
}

/// Terminal dimension in `1..=u16::MAX`
fn dimension(value: i64) -> Option<u16> {
    u16::try_from(value).ok().filter(|v| *v > 0)
}

/// Kind of reachability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// ICMP echo request
    Icmp,
    /// TCP connect handshake
    Tcp,
    /// HTTP GET request
    Http,
}

impl ProbeKind {
    /// Wire name of the probe kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Icmp => "icmp",
            ProbeKind::Tcp => "tcp",
            ProbeKind::Http => "http",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "icmp" => Ok(ProbeKind::Icmp),
            "tcp" => Ok(ProbeKind::Tcp),
            "http" => Ok(ProbeKind::Http),
            other => Err(ProtocolError::UnsupportedProbe(other.to_string())),
        }
    }
}

/// Outcome of a probe, sent over the report transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "ping_result")]
pub struct ProbeResult {
    /// Probe task identifier assigned by the control plane
    pub task_id: u64,
    /// Which probe was run
    pub ping_type: ProbeKind,
    /// Measured latency in milliseconds, 0 on failure
    pub value: u64,
    /// Completion time
    pub finished_at: DateTime<Utc>,
}

/// Outcome of a remote execution task, uploaded over HTTP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task identifier assigned by the control plane
    pub task_id: TaskId,
    /// Combined stdout/stderr text
    pub result: String,
    /// Process exit code, or a negative sentinel when nothing ran
    pub exit_code: i32,
    /// Completion time
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    /// Exit code reported when a task was rejected or could not be started
    pub const SENTINEL_EXIT_CODE: i32 = -1;

    /// Create a result stamped with the current time
    pub fn now(task_id: TaskId, result: impl Into<String>, exit_code: i32) -> Self {
        Self {
            task_id,
            result: result.into(),
            exit_code,
            finished_at: Utc::now(),
        }
    }
}
