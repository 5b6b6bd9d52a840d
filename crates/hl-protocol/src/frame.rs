//! Transport frames
//!
//! A frame is one discrete message unit on a duplex transport. The control
//! plane speaks JSON in text frames; terminal output travels as binary
//! frames.

use bytes::Bytes;
use serde::Serialize;

use crate::error::ProtocolError;

/// One message unit sent or received over a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload
    Text(String),
    /// Raw binary payload
    Binary(Bytes),
}

impl Frame {
    /// Create a text frame
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a binary frame
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Serialize a value as a JSON text frame
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ProtocolError> {
        Ok(Self::Text(serde_json::to_string(value)?))
    }

    /// Payload bytes regardless of frame kind
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(data) => data,
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is a text frame
    pub fn is_text(&self) -> bool {
        matches!(self, Frame::Text(_))
    }
}
