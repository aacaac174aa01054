//! WebSocket transport for sessions (tokio-tungstenite).

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::protocol::ClientCommand;
use super::{SessionSocket, SessionTransport};

/// Connects to the game socket, passing the credential as `?token=`.
pub struct WsTransport {
    ws_url: String,
}

impl WsTransport {
    pub fn new(ws_url: &str) -> Self {
        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, token: &SecretString) -> String {
        format!(
            "{}/?token={}",
            self.ws_url,
            urlencoding::encode(token.expose_secret())
        )
    }
}

#[async_trait]
impl SessionTransport for WsTransport {
    async fn connect(&self, token: &SecretString) -> Result<Box<dyn SessionSocket>> {
        let (stream, response) = connect_async(self.url_for(token).as_str())
            .await
            .context("WebSocket handshake failed")?;
        debug!(status = ?response.status(), "WebSocket connected");
        Ok(Box::new(WsSocket {
            stream,
            closed: false,
        }))
    }
}

struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl SessionSocket for WsSocket {
    async fn send(&mut self, command: &ClientCommand) -> Result<()> {
        let text = serde_json::to_string(command).context("Failed to encode command")?;
        self.stream
            .send(Message::Text(text))
            .await
            .context("WebSocket send failed")
    }

    async fn next_message(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by server");
                    self.closed = true;
                    return None;
                }
                // Ping/pong are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(e).context("WebSocket receive failed")),
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close failed");
        }
    }
}
