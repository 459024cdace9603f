//! WebSocket Feed Transport
//!
//! `FeedConnector` / `FeedConnection` implementations backed by
//! `tokio-tungstenite`. Text and binary messages become data frames;
//! ping/pong traffic is answered here and surfaced as heartbeats.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{FeedConnection, FeedConnector, Frame, RawMessage, TransportError};

/// Upper bound on the closing handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens WebSocket sessions to a fixed feed URL.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Create a connector for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedConnector for WsConnector {
    type Connection = WsConnection;

    async fn connect(&self) -> Result<Self::Connection, TransportError> {
        let connecting = tokio_tungstenite::connect_async(self.url.as_str());
        let (stream, response) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| TransportError::ConnectTimeout(self.connect_timeout))?
            .map_err(connect_error)?;

        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        Ok(WsConnection {
            stream,
            closed: false,
        })
    }
}

fn connect_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Url(e) => TransportError::InvalidTarget(e.to_string()),
        other => TransportError::Connect(other.to_string()),
    }
}

/// An established WebSocket session.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl FeedConnection for WsConnection {
    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        if self.closed {
            return Ok(None);
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Frame::Data(RawMessage::from(text.as_str()))));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Frame::Data(RawMessage::from(data.to_vec()))));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| TransportError::Read(e.to_string()))?;
                    return Ok(Some(Frame::Heartbeat));
                }
                Some(Ok(Message::Pong(_))) => return Ok(Some(Frame::Heartbeat)),
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(frame = ?frame, "Server sent close frame");
                    self.closed = true;
                    return Ok(None);
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => return Err(TransportError::Read(e.to_string())),
                None => {
                    self.closed = true;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        match tokio::time::timeout(CLOSE_TIMEOUT, self.stream.close(None)).await {
            Ok(Ok(())) => tracing::debug!("WebSocket closed"),
            Ok(Err(e)) => tracing::debug!(error = %e, "WebSocket close failed"),
            Err(_) => tracing::debug!("WebSocket close timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_connection_is_transient() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WsConnector::new(format!("ws://{addr}/ws"), Duration::from_secs(2));
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)), "got {err:?}");
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn unsupported_scheme_is_fatal() {
        let connector = WsConnector::new("ftp://example.com/feed", Duration::from_secs(2));
        let err = connector.connect().await.unwrap_err();
        assert!(err.is_fatal(), "got {err:?}");
    }

    #[tokio::test]
    async fn stalled_handshake_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let connector = WsConnector::new(format!("ws://{addr}/ws"), Duration::from_millis(200));
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectTimeout(_)), "got {err:?}");
    }
}
