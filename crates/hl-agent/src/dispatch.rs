//! Inbound request dispatch
//!
//! The receive loop reads frames off the report transport and hands each to
//! the `Dispatcher`, which classifies it and starts the matching handler on
//! its own task. The loop never waits for a handler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use hl_protocol::{Envelope, Frame, ProtocolError};

use crate::probe::run_probe;
use crate::state::AgentState;
use crate::task::run_task;
use crate::terminal::run_terminal;
use crate::transport::{FrameStream, SafeConn};

/// Routes inbound envelopes to their handlers
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<AgentState>,
    conn: Arc<SafeConn>,
}

impl Dispatcher {
    /// Create a dispatcher whose probe results go out over `conn`
    pub fn new(state: Arc<AgentState>, conn: Arc<SafeConn>) -> Self {
        Self { state, conn }
    }

    /// Decode one frame and start its handler.
    ///
    /// Returns the handler class chosen, or the decode error for frames that
    /// are not JSON objects.
    pub fn dispatch(&self, frame: &Frame) -> Result<&'static str, ProtocolError> {
        let envelope = Envelope::decode(frame.as_bytes())?;
        let kind = envelope.kind();
        self.route(envelope);
        Ok(kind)
    }

    /// Start the handler for an already classified envelope
    pub fn route(&self, envelope: Envelope) {
        match envelope {
            Envelope::Terminal { request_id } => {
                tracing::info!("Terminal requested: {}", request_id);
                tokio::spawn(run_terminal(Arc::clone(&self.state), request_id));
            }
            Envelope::Exec { task_id, command } => {
                tokio::spawn(run_task(Arc::clone(&self.state), task_id, command));
            }
            Envelope::Ping {
                task_id,
                kind,
                target,
            } => {
                tokio::spawn(run_probe(
                    Arc::clone(&self.state),
                    Arc::clone(&self.conn),
                    task_id,
                    kind,
                    target,
                ));
            }
            Envelope::Ignored { reason } => {
                // Unknown kinds are routine; malformed requests of a known kind are not
                if reason.starts_with("unknown") || reason.starts_with("empty") {
                    tracing::debug!("Ignoring inbound message: {}", reason);
                } else {
                    tracing::warn!("Ignoring inbound message: {}", reason);
                }
            }
        }
    }
}

/// Read the report transport until it fails or closes, then cancel `lost`
pub async fn run_receive_loop(
    mut stream: FrameStream,
    dispatcher: Dispatcher,
    lost: CancellationToken,
) {
    let _lost_on_exit = lost.drop_guard();

    loop {
        match stream.recv().await {
            Some(Ok(frame)) => {
                if let Err(e) = dispatcher.dispatch(&frame) {
                    tracing::warn!("Dropping malformed message: {}", e);
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Report transport read failed: {}", e);
                break;
            }
            None => {
                tracing::info!("Report transport closed by peer");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use hl_core::config::AgentConfig;

    use crate::transport::duplex;

    fn state() -> Arc<AgentState> {
        let config = AgentConfig {
            endpoint: "http://panel.test".into(),
            token: "tok".into(),
            probe_timeout: Duration::from_millis(500),
            ..AgentConfig::default()
        };
        Arc::new(AgentState::new(config).unwrap())
    }

    #[tokio::test]
    async fn test_dispatch_priority() {
        let (conn, _stream, _peer) = duplex::pair();
        let dispatcher = Dispatcher::new(state(), Arc::new(conn));

        let cases: &[(&str, &str)] = &[
            (r#"{"message":"exec","request_id":"r1","task_id":"t"}"#, "terminal"),
            (r#"{"message":"terminal"}"#, "terminal"),
            (r#"{"message":"exec","task_id":"t","command":"true","ping_type":"tcp"}"#, "exec"),
            (r#"{"ping_type":"tcp","ping_task_id":3,"ping_target":"127.0.0.1:9"}"#, "ping"),
            (r#"{"message":"exec"}"#, "ignored"),
            (r#"{"message":"ping","ping_task_id":0,"ping_type":"tcp"}"#, "ignored"),
            (r#"{"message":"ping","ping_task_id":4,"ping_type":"udp"}"#, "ignored"),
            (r#"{"message":"hello"}"#, "ignored"),
            (r#"{}"#, "ignored"),
        ];

        for (payload, expected) in cases {
            let kind = dispatcher.dispatch(&Frame::text(*payload)).unwrap();
            assert_eq!(kind, *expected, "payload {}", payload);
        }
    }

    #[tokio::test]
    async fn test_malformed_frames_are_errors() {
        let (conn, _stream, _peer) = duplex::pair();
        let dispatcher = Dispatcher::new(state(), Arc::new(conn));

        assert!(dispatcher.dispatch(&Frame::text("not json")).is_err());
        assert!(dispatcher.dispatch(&Frame::binary(vec![0xff, 0x00])).is_err());
        // Binary frames carrying JSON are accepted
        assert_eq!(
            dispatcher.dispatch(&Frame::binary(br#"{"message":"x"}"#.to_vec())).unwrap(),
            "ignored"
        );
    }

    #[tokio::test]
    async fn test_receive_loop_survives_bad_frames_and_signals_loss() {
        let (conn, stream, mut peer) = duplex::pair();
        let conn = Arc::new(conn);
        let dispatcher = Dispatcher::new(state(), Arc::clone(&conn));
        let lost = CancellationToken::new();

        let receive = tokio::spawn(run_receive_loop(stream, dispatcher, lost.clone()));

        assert!(peer.send(Frame::text("garbage")));
        assert!(peer.send(Frame::text(
            r#"{"message":"ping","ping_task_id":5,"ping_type":"tcp","ping_target":"127.0.0.1:1"}"#
        )));

        // The probe answers over the same transport
        let frame = tokio::time::timeout(Duration::from_secs(5), peer.recv())
            .await
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(frame.as_bytes()).unwrap();
        assert_eq!(json["type"], "ping_result");
        assert_eq!(json["task_id"], 5);

        assert!(!lost.is_cancelled());
        peer.fail("reset by peer");
        tokio::time::timeout(Duration::from_secs(5), lost.cancelled())
            .await
            .unwrap();
        receive.await.unwrap();
    }
}
