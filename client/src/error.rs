use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The relay refused the handshake, usually `401` for a bad token.
    #[error("connection rejected with HTTP {0}")]
    Rejected(u16),

    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("malformed server message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
