//! Error types for the bayeux-client crate.

use bayeux_transport::TransportError;

use crate::protocol::ErrorDetail;

/// Errors produced by the Bayeux client.
///
/// None of these are fatal: each leaves the client in a state from which a
/// fresh `connect()` can be attempted.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An error reported by the underlying transport
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The connection could not be established or was lost
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The server answered the handshake with `successful: false`
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The server answered a connect request with `successful: false`
    #[error("Connect rejected: {0}")]
    ConnectRejected(String),

    /// The server refused a subscription
    #[error("Subscription to {channel} rejected: {error}")]
    SubscriptionRejected {
        /// The channel that was refused
        channel: String,
        /// The error text returned by the server
        error: String,
    },

    /// An operation needing a client id ran before the handshake completed
    #[error("No client id for {operation}: handshake has not completed")]
    MissingSessionIdentity {
        /// The operation that was suppressed
        operation: &'static str,
    },

    /// The operation was refused because a disconnect is waiting for the server
    #[error("Cannot {operation} while a disconnect is in progress")]
    DisconnectInProgress {
        /// The operation that was refused
        operation: &'static str,
    },

    /// An envelope could not be converted to or from text
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A channel name is malformed or reserved
    #[error("Invalid channel '{channel}': {reason}")]
    InvalidChannel {
        /// The offending channel name
        channel: String,
        /// Why it was refused
        reason: &'static str,
    },

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A lock guarding client state was poisoned by a panicking thread
    #[error("Internal lock poisoned")]
    LockPoisoned,

    /// An error occurred during shutdown
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

impl ClientError {
    /// The server's error string split into code, args and message, for
    /// errors that carry one.
    pub fn error_detail(&self) -> Option<ErrorDetail> {
        match self {
            ClientError::HandshakeRejected(error)
            | ClientError::ConnectRejected(error)
            | ClientError::SubscriptionRejected { error, .. } => Some(ErrorDetail::parse(error)),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;
