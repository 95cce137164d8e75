//! Push channel WebSocket connection and frame handling

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use super::envelope::{ClientEnvelope, ServerEnvelope};
use crate::error::ChatError;

/// Upper bound on the TCP + TLS + upgrade handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// An open push channel.
#[async_trait]
pub trait PushSocket: Send {
    async fn send(&mut self, envelope: &ClientEnvelope) -> Result<()>;

    /// Next decodable envelope. `Ok(None)` means the peer closed the channel.
    async fn recv(&mut self) -> Result<Option<ServerEnvelope>>;

    async fn close(&mut self);
}

/// Opens push channels; one call per connection attempt.
#[async_trait]
pub trait PushConnector: Send + Sync + 'static {
    type Socket: PushSocket + 'static;

    async fn connect(&self) -> Result<Self::Socket>;
}

/// Connects to `{ws_base}/{email}`.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    type Socket = WsSocket;

    async fn connect(&self) -> Result<WsSocket> {
        WsSocket::connect(&self.url).await
    }
}

pub struct WsSocket {
    stream: WsStream,
}

impl WsSocket {
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::info!("Connecting push channel to {}", url);

        let (stream, response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| ChatError::Transport(format!("no handshake within {:?}", CONNECT_TIMEOUT)))
            .context("WebSocket connection failed")?
            .map_err(|e| ChatError::Transport(e.to_string()))
            .context("WebSocket connection failed")?;

        tracing::info!("Push channel connected (status={})", response.status());

        Ok(Self { stream })
    }

    async fn send_text(&mut self, msg: String) -> Result<()> {
        tracing::debug!("WS send: {}", msg);
        self.stream
            .send(WsMessage::Text(msg))
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))
            .context("Failed to send WebSocket message")
    }
}

#[async_trait]
impl PushSocket for WsSocket {
    async fn send(&mut self, envelope: &ClientEnvelope) -> Result<()> {
        let text = envelope.encode()?;
        self.send_text(text).await
    }

    /// Receive the next envelope, answering pings and skipping frames that
    /// do not decode. A bad frame is never fatal to the connection.
    async fn recv(&mut self) -> Result<Option<ServerEnvelope>> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    tracing::debug!("WS recv: {}", text);
                    match ServerEnvelope::decode(&text) {
                        Ok(envelope) => return Ok(Some(envelope)),
                        Err(e) => tracing::warn!("Ignoring push frame: {:#}", e),
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    self.stream
                        .send(WsMessage::Pong(data))
                        .await
                        .map_err(|e| ChatError::Transport(e.to_string()))
                        .context("Failed to send pong")?;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(ChatError::Transport(e.to_string())).context("WebSocket receive error");
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("WebSocket close: {}", e);
        }
    }
}
