//! Per-connection outbound queue and the writer task that drains it.
//!
//! Every connection has exactly one writer task, which is the only code that
//! touches the socket's sending half. Everyone else (the lifecycle manager,
//! the broadcast engine, the keepalive loop) pushes frames into the bounded
//! queue through a cloned [`Outbound`] handle.

use futures::{Sink, SinkExt};
use log::{debug, warn};
use shared::PlayerId;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    QueueFull,
    #[error("connection is closed")]
    Closed,
    #[error("send timed out")]
    TimedOut,
}

/// Thread-safe send primitive for one connection.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Message>,
}

impl Outbound {
    /// Creates the queue. The receiver belongs to the connection's writer.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queues a frame without waiting. Used by broadcasts so a slow
    /// recipient can never stall the sender.
    pub fn try_deliver(&self, message: Message) -> Result<(), DeliveryError> {
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Queues a frame, waiting at most `timeout` for room.
    pub async fn send_within(&self, message: Message, timeout: Duration) -> Result<(), DeliveryError> {
        self.tx.send_timeout(message, timeout).await.map_err(|e| match e {
            SendTimeoutError::Timeout(_) => DeliveryError::TimedOut,
            SendTimeoutError::Closed(_) => DeliveryError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drains `rx` into `sink` until cancelled, the queue is dropped, or a
/// write fails. Each write is bounded by `send_timeout`.
///
/// Returning drops `rx`, which closes the queue for every [`Outbound`]
/// clone. The keepalive loop notices that on its next probe.
pub async fn run_writer<S>(
    owner: PlayerId,
    mut sink: S,
    mut rx: mpsc::Receiver<Message>,
    send_timeout: Duration,
    cancel: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        match tokio::time::timeout(send_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Writer for {} stopping after send error: {}", owner, e);
                break;
            }
            Err(_) => {
                warn!("Writer for {} timed out after {:?}", owner, send_timeout);
                break;
            }
        }
    }

    rx.close();
    let _ = tokio::time::timeout(send_timeout, sink.close()).await;
    debug!("Writer for {} finished", owner);
}
