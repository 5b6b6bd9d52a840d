//! Inbound control envelopes
//!
//! The control plane sends flat JSON objects on the report transport:
//!
//! ```json
//! {"message": "exec", "task_id": "t1", "command": "uptime"}
//! {"message": "terminal", "request_id": "s1"}
//! {"message": "ping", "ping_task_id": 9, "ping_type": "tcp", "ping_target": "example.com:443"}
//! ```
//!
//! They are decoded once into [`Envelope`], which carries exactly the fields
//! its handler needs. Classification priority is terminal, exec, ping; any
//! other shape is [`Envelope::Ignored`].

use serde::Deserialize;

use crate::error::ProtocolError;
use crate::ids::{RequestId, TaskId};
use crate::message::ProbeKind;

/// Flat wire shape of an inbound message
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEnvelope {
    message: Option<String>,
    request_id: Option<String>,
    command: Option<String>,
    task_id: Option<String>,
    ping_task_id: Option<u64>,
    ping_type: Option<String>,
    ping_target: Option<String>,
}

/// A decoded, classified inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Open an interactive terminal on a dedicated transport
    Terminal { request_id: RequestId },
    /// Run a one-shot command
    Exec { task_id: TaskId, command: String },
    /// Probe a network target
    Ping {
        task_id: u64,
        kind: ProbeKind,
        target: String,
    },
    /// Nothing to do; carries a short reason for logging
    Ignored { reason: String },
}

impl Envelope {
    /// Decode and classify a raw frame payload
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let raw: RawEnvelope = serde_json::from_slice(payload)?;
        Ok(raw.classify())
    }

    /// Short name of the handler class this envelope selects
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Terminal { .. } => "terminal",
            Envelope::Exec { .. } => "exec",
            Envelope::Ping { .. } => "ping",
            Envelope::Ignored { .. } => "ignored",
        }
    }

    fn ignored(reason: impl Into<String>) -> Self {
        Envelope::Ignored {
            reason: reason.into(),
        }
    }
}

impl RawEnvelope {
    fn classify(self) -> Envelope {
        let message = self.message.as_deref().unwrap_or_default();
        let request_id = self.request_id.unwrap_or_default();

        if !request_id.is_empty() || message == "terminal" {
            return Envelope::Terminal {
                request_id: RequestId(request_id),
            };
        }

        if message == "exec" {
            let task_id = self.task_id.unwrap_or_default();
            if task_id.is_empty() {
                return Envelope::ignored("exec request without task_id");
            }
            return Envelope::Exec {
                task_id: TaskId(task_id),
                command: self.command.unwrap_or_default(),
            };
        }

        if message == "ping" || self.ping_type.is_some() {
            let task_id = self.ping_task_id.unwrap_or(0);
            if task_id == 0 {
                return Envelope::ignored("ping request without ping_task_id");
            }
            let kind_name = self.ping_type.unwrap_or_default();
            let kind = match kind_name.parse::<ProbeKind>() {
                Ok(kind) => kind,
                Err(e) => return Envelope::ignored(e.to_string()),
            };
            return Envelope::Ping {
                task_id,
                kind,
                target: self.ping_target.unwrap_or_default(),
            };
        }

        if message.is_empty() {
            Envelope::ignored("empty message kind")
        } else {
            Envelope::ignored(format!("unknown message kind '{}'", message))
        }
    }
}
