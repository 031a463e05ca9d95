use tokio_tungstenite::tungstenite;

/// Failure to open a session. Nothing is usable after this.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid endpoint or credentials: {0}")]
    InvalidRequest(String),
    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),
    #[error("failed to send session configuration: {0}")]
    Configure(#[from] SendError),
}

/// Failure to transmit a single command. The session stays open.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("session is not connected")]
    NotConnected,
    #[error("failed to serialize command: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write to socket: {0}")]
    Transport(#[from] tungstenite::Error),
}

impl SendError {
    /// Whether the failure means the socket itself is gone.
    pub fn is_closed(&self) -> bool {
        match self {
            Self::NotConnected => true,
            Self::Transport(e) => matches!(
                e,
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
            ),
            Self::Serialize(_) => false,
        }
    }
}

/// Why the inbound side of the connection stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame.
    ClosedByPeer(Option<String>),
    /// The stream ended without a close frame.
    StreamEnded,
    /// A fatal socket error.
    Error(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClosedByPeer(Some(reason)) => write!(f, "closed by peer: {}", reason),
            Self::ClosedByPeer(None) => write!(f, "closed by peer"),
            Self::StreamEnded => write!(f, "stream ended"),
            Self::Error(e) => write!(f, "socket error: {}", e),
        }
    }
}
