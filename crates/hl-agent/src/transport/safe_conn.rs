//! Serialized frame transport
//!
//! `SafeConn` is the write half of a duplex connection. Any number of tasks
//! may hold it behind an `Arc` and send concurrently; each frame is written
//! whole before the next one starts. `FrameStream` is the read half and has
//! exactly one owner.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;

use hl_core::error::ConnectionError;
use hl_protocol::Frame;

/// Boxed write half of a transport
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = ConnectionError> + Send>>;

/// Boxed read half of a transport
pub type FrameSource = Pin<Box<dyn Stream<Item = Result<Frame, ConnectionError>> + Send>>;

/// Write half of a transport with mutually exclusive sends
pub struct SafeConn {
    sink: Mutex<FrameSink>,
    closed: AtomicBool,
}

impl SafeConn {
    /// Wrap a frame sink
    pub fn new(sink: FrameSink) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
        }
    }

    /// Write one frame.
    ///
    /// Concurrent callers are serialized. The lock is released on every exit
    /// path, including when the returned future is dropped mid-write.
    pub async fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }

        let mut sink = self.sink.lock().await;
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        sink.send(frame).await
    }

    /// Write one frame, giving up after `timeout`
    pub async fn send_timeout(
        &self,
        frame: Frame,
        timeout: Duration,
    ) -> Result<(), ConnectionError> {
        tokio::time::timeout(timeout, self.send(frame))
            .await
            .map_err(|_| ConnectionError::SendTimeout(timeout))?
    }

    /// Serialize `value` as JSON and write it as a text frame, giving up
    /// after `timeout`
    pub async fn send_json<T: Serialize>(
        &self,
        value: &T,
        timeout: Duration,
    ) -> Result<(), ConnectionError> {
        let frame = Frame::json(value)?;
        self.send_timeout(frame, timeout).await
    }

    /// Close the transport. Later sends fail with `ConnectionError::Closed`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            tracing::debug!("Error while closing transport: {}", e);
        }
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Read half of a transport
pub struct FrameStream {
    inner: FrameSource,
}

impl FrameStream {
    /// Wrap a frame source
    pub fn new(inner: FrameSource) -> Self {
        Self { inner }
    }

    /// Next inbound frame; `None` once the peer has gone away
    pub async fn recv(&mut self) -> Option<Result<Frame, ConnectionError>> {
        self.inner.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    /// Sink that flushes one byte per poll, yielding in between, so that
    /// any interleaving of two writers would show up on the wire.
    struct ByteAtATime {
        wire: Arc<std::sync::Mutex<Vec<u8>>>,
        pending: VecDeque<u8>,
    }

    impl Sink<Frame> for ByteAtATime {
        type Error = ConnectionError;

        fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            self.poll_flush(cx)
        }

        fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
            self.pending.extend(item.as_bytes().iter().copied());
            Ok(())
        }

        fn poll_flush(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            match self.pending.pop_front() {
                None => Poll::Ready(Ok(())),
                Some(byte) => {
                    self.wire.lock().unwrap().push(byte);
                    if self.pending.is_empty() {
                        Poll::Ready(Ok(()))
                    } else {
                        cx.waker().wake_by_ref();
                        Poll::Pending
                    }
                }
            }
        }

        fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            self.poll_flush(cx)
        }
    }

    fn byte_wire() -> (SafeConn, Arc<std::sync::Mutex<Vec<u8>>>) {
        let wire = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = ByteAtATime {
            wire: Arc::clone(&wire),
            pending: VecDeque::new(),
        };
        (SafeConn::new(Box::pin(sink)), wire)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_do_not_interleave() {
        let (conn, wire) = byte_wire();
        let conn = Arc::new(conn);

        let mut handles = Vec::new();
        for sender in 0..8usize {
            let conn = Arc::clone(&conn);
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    let payload = "x".repeat(10 + sender * 7);
                    conn.send(Frame::text(format!("<{}:{}>", sender, payload)))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let wire = String::from_utf8(wire.lock().unwrap().clone()).unwrap();
        let mut seen = 0;
        for token in wire.split_terminator('>') {
            let body = token.strip_prefix('<').expect("frame starts with '<'");
            assert!(!body.contains('<'), "interleaved frame: {}", token);
            let (sender, payload) = body.split_once(':').unwrap();
            let sender: usize = sender.parse().unwrap();
            assert_eq!(payload.len(), 10 + sender * 7);
            seen += 1;
        }
        assert_eq!(seen, 40);
    }

    #[tokio::test]
    async fn test_send_json_writes_text_frame() {
        let (conn, wire) = byte_wire();
        conn.send_json(&serde_json::json!({"task_id": 3}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(wire.lock().unwrap().as_slice(), br#"{"task_id":3}"#);
    }

    #[tokio::test]
    async fn test_send_after_close_fails_fast() {
        let (conn, wire) = byte_wire();
        conn.send(Frame::text("a")).await.unwrap();
        conn.close().await;
        conn.close().await;

        assert!(conn.is_closed());
        assert!(matches!(
            conn.send(Frame::text("b")).await,
            Err(ConnectionError::Closed)
        ));
        assert_eq!(wire.lock().unwrap().as_slice(), b"a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_releases_lock() {
        struct Stuck;
        impl Sink<Frame> for Stuck {
            type Error = ConnectionError;
            fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), ConnectionError>> {
                Poll::Pending
            }
            fn start_send(self: Pin<&mut Self>, _: Frame) -> Result<(), ConnectionError> {
                Ok(())
            }
            fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), ConnectionError>> {
                Poll::Pending
            }
            fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), ConnectionError>> {
                Poll::Ready(Ok(()))
            }
        }

        let conn = SafeConn::new(Box::pin(Stuck));
        let first = conn
            .send_timeout(Frame::text("a"), Duration::from_secs(10))
            .await;
        assert!(matches!(first, Err(ConnectionError::SendTimeout(_))));

        // The lock was released when the timed-out send was dropped
        let second = conn
            .send_timeout(Frame::text("b"), Duration::from_secs(1))
            .await;
        assert!(matches!(second, Err(ConnectionError::SendTimeout(_))));
    }
}
