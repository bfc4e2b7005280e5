//! Per-connection reader for client frames.
//!
//! Only `update` is acted on; any other tag is accepted and ignored. A frame
//! that does not decode ends the connection.

use crate::error::Result;
use crate::lifecycle::{CloseReason, Session};
use futures::{Stream, StreamExt};
use log::{debug, warn};
use shared::{ClientMessage, Envelope};
use tokio_tungstenite::tungstenite::{self, Message};

/// Reads until the client goes away, a read fails, a frame fails to decode
/// or the session is cancelled. The caller closes the session with the
/// returned reason.
pub async fn run<R>(session: &Session, mut stream: R) -> CloseReason
where
    R: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = session.cancelled() => return CloseReason::ServerShutdown,
            frame = stream.next() => frame,
        };

        let payload = match frame {
            None | Some(Ok(Message::Close(_))) => return CloseReason::ClientClosed,
            Some(Err(e)) => {
                debug!("Read error from {}: {}", session.id(), e);
                return CloseReason::ReadError;
            }
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(bytes))) => bytes,
            Some(Ok(_)) => continue,
        };

        if let Err(e) = handle_frame(session, &payload).await {
            warn!("Closing {}: {}", session.id(), e);
            return CloseReason::DecodeFailure;
        }
    }
}

pub async fn handle_frame(session: &Session, payload: &[u8]) -> Result<()> {
    match Envelope::decode(payload)?.into_client_message() {
        ClientMessage::Update(motion) => {
            session.apply_update(motion).await;
        }
        ClientMessage::Other(tag) => {
            debug!("Ignoring {:?} message from {}", tag, session.id());
        }
    }
    Ok(())
}
