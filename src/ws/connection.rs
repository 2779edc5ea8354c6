//! WebSocket connection
//!
//! tokio-tungstenite socket with a bounded connect, TCP_NODELAY, frame
//! timestamps for idle detection and close-code classification.

use crate::exchanges::traits::CloseKind;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
    MaybeTlsStream, WebSocketStream,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One upstream socket; `recv` stamps every frame for the idle watchdog
pub struct WebSocketConnection {
    socket: Socket,
    open: bool,
    last_frame_at: Instant,
    url: String,
}

/// Errors that can occur with WebSocket connections
#[derive(Debug, thiserror::Error)]
pub enum WebSocketError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Timeout")]
    Timeout,
    #[error("Not connected")]
    NotConnected,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WebSocketError>;

impl WebSocketConnection {
    /// Connect to a ws:// or wss:// endpoint within `connect_timeout`
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self> {
        let (socket, _) = match timeout(connect_timeout, connect_async(url)).await {
            Ok(Ok(handshake)) => handshake,
            Ok(Err(e)) => return Err(WebSocketError::ConnectionFailed(e.to_string())),
            Err(_) => return Err(WebSocketError::Timeout),
        };

        if let MaybeTlsStream::Plain(tcp) = socket.get_ref() {
            tcp.set_nodelay(true)
                .map_err(|e| WebSocketError::ConnectionFailed(e.to_string()))?;
        }
        crate::log_ws!(tracing::Level::DEBUG, "Connected to {}", url);

        Ok(Self {
            socket,
            open: true,
            last_frame_at: Instant::now(),
            url: url.to_string(),
        })
    }

    async fn send(&mut self, msg: Message) -> Result<()> {
        if !self.open {
            return Err(WebSocketError::NotConnected);
        }
        self.socket
            .send(msg)
            .await
            .map_err(|e| WebSocketError::SendFailed(e.to_string()))
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send(Message::text(text.to_string())).await
    }

    /// Client keepalive
    pub async fn send_ping(&mut self) -> Result<()> {
        self.send(Message::Ping(Bytes::new())).await
    }

    /// Next frame; `Ok(None)` once the peer has gone away without a close
    /// frame. A close frame or a read error marks the socket closed.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        if !self.open {
            return Err(WebSocketError::NotConnected);
        }

        let next = self.socket.next().await;
        self.last_frame_at = Instant::now();
        match next {
            Some(Ok(msg)) => {
                self.open = !matches!(msg, Message::Close(_));
                Ok(Some(msg))
            }
            Some(Err(e)) => {
                self.open = false;
                Err(WebSocketError::ReceiveFailed(e.to_string()))
            }
            None => {
                self.open = false;
                Ok(None)
            }
        }
    }

    #[inline]
    pub fn idle_duration(&self) -> Duration {
        self.last_frame_at.elapsed()
    }

    /// Close handshake, best effort
    pub async fn close(&mut self) {
        if std::mem::replace(&mut self.open, false) {
            if let Err(e) = self.socket.close(None).await {
                crate::log_ws!(tracing::Level::DEBUG, "Close handshake failed for {}: {}", self.url, e);
            }
        }
    }
}

/// Normal (1000) and going-away (1001) closes are clean; anything else,
/// including a close without a frame, is abnormal
pub fn classify_close(frame: Option<&CloseFrame>) -> CloseKind {
    match frame {
        Some(f) if matches!(f.code, CloseCode::Normal | CloseCode::Away) => CloseKind::Clean,
        Some(f) => CloseKind::Abnormal(format!("close code {}: {}", u16::from(f.code), &*f.reason)),
        None => CloseKind::Abnormal("close without status".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(code: CloseCode) -> CloseFrame {
        CloseFrame {
            code,
            reason: "bye".into(),
        }
    }

    #[test]
    fn test_classify_close() {
        assert_eq!(classify_close(Some(&frame(CloseCode::Normal))), CloseKind::Clean);
        assert_eq!(classify_close(Some(&frame(CloseCode::Away))), CloseKind::Clean);
        assert!(matches!(
            classify_close(Some(&frame(CloseCode::Policy))),
            CloseKind::Abnormal(reason) if reason.contains("1008")
        ));
        assert!(matches!(classify_close(None), CloseKind::Abnormal(_)));
    }

    #[test]
    fn test_websocket_error_display() {
        assert_eq!(WebSocketError::NotConnected.to_string(), "Not connected");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 9 (discard) on localhost is not expected to accept websocket upgrades
        let result = WebSocketConnection::connect("ws://127.0.0.1:9/ws", Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}
