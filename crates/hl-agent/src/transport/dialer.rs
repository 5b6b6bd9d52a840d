//! Outbound WebSocket dialer
//!
//! Opens the duplex transports used for reports and terminal sessions.

use std::time::Duration;

use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use reqwest::Url;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, WebSocketStream};

use hl_core::error::ConnectionError;
use hl_protocol::Frame;

use super::safe_conn::{FrameStream, SafeConn};

/// Opens transports to the control plane
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Perform the handshake and return both halves of the transport
    async fn dial(&self, url: &Url) -> Result<(SafeConn, FrameStream), ConnectionError>;
}

/// WebSocket dialer with a bounded handshake
pub struct WsDialer {
    handshake_timeout: Duration,
}

impl WsDialer {
    /// Create a dialer whose handshakes give up after `handshake_timeout`
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self, url: &Url) -> Result<(SafeConn, FrameStream), ConnectionError> {
        tracing::debug!("Dialing {}", redact(url));

        let (ws, response) = tokio::time::timeout(self.handshake_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ConnectionError::HandshakeTimeout(self.handshake_timeout))?
            .map_err(handshake_error)?;

        tracing::debug!("Handshake complete ({})", response.status());
        Ok(split_websocket(ws))
    }
}

/// Split a WebSocket into a serialized writer and a frame reader.
///
/// Control messages (ping, pong, close) are handled by tungstenite and never
/// surface as frames.
pub fn split_websocket<S>(ws: WebSocketStream<S>) -> (SafeConn, FrameStream)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();

    let sink = sink
        .with(|frame: Frame| future::ready(Ok::<_, tungstenite::Error>(into_message(frame))))
        .sink_map_err(|e| ConnectionError::Send(e.to_string()));

    let stream = stream.filter_map(|message| {
        future::ready(match message {
            Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
            Ok(Message::Binary(data)) => Some(Ok(Frame::binary(data))),
            Ok(_) => None,
            Err(e) => Some(Err(ConnectionError::Receive(e.to_string()))),
        })
    });

    (
        SafeConn::new(Box::pin(sink)),
        FrameStream::new(Box::pin(stream)),
    )
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(data) => Message::Binary(data.to_vec()),
    }
}

fn handshake_error(e: tungstenite::Error) -> ConnectionError {
    match e {
        tungstenite::Error::Http(response) => {
            ConnectionError::Handshake(format!("server answered {}", response.status()))
        }
        other => ConnectionError::Handshake(other.to_string()),
    }
}

/// URL without its query string, for logging
pub(crate) fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_strips_token() {
        let url = Url::parse("wss://panel.example.com/api/clients/report?token=secret").unwrap();
        assert_eq!(redact(&url), "wss://panel.example.com/api/clients/report");
    }

    #[tokio::test]
    async fn test_dial_refused_is_handshake_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dialer = WsDialer::new(Duration::from_secs(2));
        let url = Url::parse(&format!("ws://{}/api/clients/report", addr)).unwrap();
        let result = dialer.dial(&url).await;
        assert!(matches!(result, Err(ConnectionError::Handshake(_))));
    }

    #[tokio::test]
    async fn test_dial_times_out_on_silent_server() {
        // Accepts TCP but never answers the upgrade request
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let dialer = WsDialer::new(Duration::from_millis(200));
        let url = Url::parse(&format!("ws://{}/", addr)).unwrap();
        let result = dialer.dial(&url).await;
        assert!(matches!(result, Err(ConnectionError::HandshakeTimeout(_))));
    }
}
