//! Error types for the bayeux-transport crate.

/// Errors raised by a [`Transport`](crate::Transport) implementation.
///
/// Transport errors never travel up a call stack: every `Transport` method is
/// fire-and-forget, so errors are reported through
/// [`TransportEvent`](crate::TransportEvent) instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The endpoint URL could not be parsed or uses an unsupported scheme
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The connection could not be established
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The WebSocket layer reported an error on an open connection
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// A frame was written while no connection was open
    #[error("Transport is not connected")]
    NotConnected,

    /// The remote side closed the connection
    #[error("Connection closed by peer")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(error.to_string())
    }
}

/// Convenience type alias for Results using TransportError.
pub type Result<T> = std::result::Result<T, TransportError>;
