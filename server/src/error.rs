//! Error taxonomy for the relay.
//!
//! Stale updates (an `update` for a player that is already gone) are not
//! errors: [`Registry::update`](crate::registry::Registry::update) reports
//! them by returning `false`.

use shared::PlayerId;
use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The presented token was absent, unknown or expired.
    #[error("admission rejected: {0}")]
    AdmissionRejected(String),

    /// An inbound frame could not be decoded. Fatal for that connection.
    #[error("decode failure: {0}")]
    Decode(#[from] serde_json::Error),

    /// A single recipient could not be handed a message.
    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: PlayerId, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
