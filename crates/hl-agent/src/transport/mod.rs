//! Duplex transports to the control plane

mod dialer;
pub mod duplex;
mod safe_conn;

pub(crate) use dialer::redact;
pub use dialer::{split_websocket, Dialer, WsDialer};
pub use safe_conn::{FrameSink, FrameSource, FrameStream, SafeConn};
