use crate::error::{ClientError, Result};
use futures::{SinkExt, StreamExt};
use log::{debug, info};
use shared::{Envelope, Motion, ServerMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// One WebSocket session with the relay.
pub struct RelayClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

/// Appends the token query parameter to a relay URL.
pub fn with_token(url: &str, token: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}token={}", url, separator, token)
}

impl RelayClient {
    /// Opens a session. A handshake refused by the relay surfaces as
    /// [`ClientError::Rejected`] with the HTTP status.
    pub async fn connect(url: &str, token: &str) -> Result<Self> {
        let target = with_token(url, token);
        match connect_async(target.as_str()).await {
            Ok((socket, _)) => {
                info!("Connected to {}", url);
                Ok(Self { socket })
            }
            Err(tungstenite::Error::Http(response)) => {
                Err(ClientError::Rejected(response.status().as_u16()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn send_update(&mut self, motion: &Motion) -> Result<()> {
        let text = serde_json::to_string(&Envelope::update(motion))?;
        self.socket.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Sends an arbitrary pre-encoded frame.
    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.socket.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Waits for the next relay message. Pings are answered by the
    /// transport and skipped here. Returns `Ok(None)` once the relay
    /// closes the connection.
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>> {
        while let Some(frame) = self.socket.next().await {
            match frame? {
                Message::Text(text) => return Ok(Some(ServerMessage::from_json(&text)?)),
                Message::Binary(bytes) => return Ok(Some(serde_json::from_slice(&bytes)?)),
                Message::Close(frame) => {
                    debug!("Relay closed the connection: {:?}", frame);
                    return Ok(None);
                }
                _ => continue,
            }
        }
        Ok(None)
    }

    /// Like [`next_message`](Self::next_message), but a closed connection
    /// is an error.
    pub async fn recv(&mut self) -> Result<ServerMessage> {
        self.next_message().await?.ok_or(ClientError::Closed)
    }

    pub async fn close(mut self) -> Result<()> {
        match self.socket.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
