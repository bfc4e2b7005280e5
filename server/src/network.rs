//! WebSocket listener.
//!
//! Accepts TCP connections, performs the upgrade on [`WS_PATH`] and checks
//! the `token` query parameter before the handshake completes. Rejected
//! callers receive `401 Unauthorized` and never reach the registry.

use crate::auth::{token_from_query, Principal};
use crate::error::Result;
use crate::lifecycle::Relay;
use futures::StreamExt;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

pub const WS_PATH: &str = "/ws";

pub struct RelayServer {
    listener: TcpListener,
    relay: Relay,
}

impl RelayServer {
    pub async fn bind(addr: &str, relay: Relay) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Self { listener, relay })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Accepts connections until the relay shuts down. Each connection runs
    /// on its own task.
    pub async fn run(self) -> Result<()> {
        let shutdown = self.relay.shutdown_token().clone();

        loop {
            let (stream, addr) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let relay = self.relay.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(relay, stream, addr).await {
                    debug!("Connection from {} ended: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(relay: Relay, stream: TcpStream, addr: SocketAddr) -> Result<()> {
    let mut admitted: Option<Principal> = None;

    let ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
        if req.uri().path() != WS_PATH {
            return Err(rejection(StatusCode::NOT_FOUND, "Not Found"));
        }

        match relay.authorize(token_from_query(req.uri().query())) {
            Ok(principal) => {
                admitted = Some(principal);
                Ok(resp)
            }
            Err(e) => {
                warn!("Rejected connection from {}: {}", addr, e);
                Err(rejection(StatusCode::UNAUTHORIZED, "Unauthorized"))
            }
        }
    })
    .await?;

    let Some(principal) = admitted else {
        return Ok(());
    };

    let (sink, stream) = ws.split();
    if relay.serve(principal, sink, stream).await.is_none() {
        warn!("Dropped connection from {}: player id collision", addr);
    }
    Ok(())
}

fn rejection(status: StatusCode, body: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_status() {
        let response = rejection(StatusCode::UNAUTHORIZED, "Unauthorized");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.body().as_deref(), Some("Unauthorized"));
    }
}
