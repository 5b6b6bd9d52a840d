//! In-memory transport pair
//!
//! Connects a `SafeConn`/`FrameStream` pair to a `DuplexPeer` that plays the
//! control plane side. Used by tests and by the fake dialers built on top.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use reqwest::Url;

use hl_core::error::ConnectionError;
use hl_protocol::Frame;

use super::dialer::Dialer;
use super::safe_conn::{FrameStream, SafeConn};

/// Control plane end of an in-memory transport
pub struct DuplexPeer {
    outbound: mpsc::UnboundedReceiver<Frame>,
    inbound: mpsc::UnboundedSender<Result<Frame, ConnectionError>>,
}

impl DuplexPeer {
    /// Deliver a frame to the agent side. Returns false if the agent hung up.
    pub fn send(&self, frame: Frame) -> bool {
        self.inbound.unbounded_send(Ok(frame)).is_ok()
    }

    /// Inject a read error on the agent side
    pub fn fail(&self, reason: &str) {
        let _ = self
            .inbound
            .unbounded_send(Err(ConnectionError::Receive(reason.to_string())));
    }

    /// Next frame written by the agent; `None` once the agent closed its writer
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbound.next().await
    }

    /// Frame already written by the agent, without waiting
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.outbound.try_next().ok().flatten()
    }

    /// End the agent's read stream while keeping its writer usable
    pub fn hang_up(&self) {
        self.inbound.close_channel();
    }
}

/// Dialer that hands out in-memory transports.
///
/// Every successful dial publishes the dialed URL and the peer end on the
/// channel returned by `DuplexDialer::new`.
pub struct DuplexDialer {
    peers: mpsc::UnboundedSender<(Url, DuplexPeer)>,
    refusing: AtomicBool,
    dials: AtomicUsize,
}

impl DuplexDialer {
    /// Create a dialer and the receiver of its peers
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(Url, DuplexPeer)>) {
        let (tx, rx) = mpsc::unbounded();
        (
            Self {
                peers: tx,
                refusing: AtomicBool::new(false),
                dials: AtomicUsize::new(0),
            },
            rx,
        )
    }

    /// Make subsequent dials fail (or succeed again)
    pub fn refuse(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of dial attempts so far, failed ones included
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for DuplexDialer {
    async fn dial(&self, url: &Url) -> Result<(SafeConn, FrameStream), ConnectionError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(ConnectionError::Handshake("connection refused".into()));
        }

        let (conn, stream, peer) = pair();
        self.peers
            .unbounded_send((url.clone(), peer))
            .map_err(|_| ConnectionError::Handshake("no listener".into()))?;
        Ok((conn, stream))
    }
}

/// Create a connected in-memory transport
pub fn pair() -> (SafeConn, FrameStream, DuplexPeer) {
    let (out_tx, out_rx) = mpsc::unbounded::<Frame>();
    let (in_tx, in_rx) = mpsc::unbounded::<Result<Frame, ConnectionError>>();

    let sink = out_tx.sink_map_err(|e| ConnectionError::Send(e.to_string()));
    let conn = SafeConn::new(Box::pin(sink));
    let stream = FrameStream::new(Box::pin(in_rx));

    (
        conn,
        stream,
        DuplexPeer {
            outbound: out_rx,
            inbound: in_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_round_trip() {
        let (conn, mut stream, mut peer) = pair();

        conn.send(Frame::text("up")).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::text("up")));

        assert!(peer.send(Frame::binary(vec![1u8, 2])));
        let frame = stream.recv().await.unwrap().unwrap();
        assert_eq!(frame, Frame::binary(vec![1u8, 2]));
    }

    #[tokio::test]
    async fn test_hang_up_ends_stream() {
        let (_conn, mut stream, peer) = pair();
        peer.hang_up();
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (conn, _stream, mut peer) = pair();
        conn.close().await;
        assert!(peer.recv().await.is_none());
    }
}
