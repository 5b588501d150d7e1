//! Events a transport reports back to its owner.

use crate::error::TransportError;

/// Notification emitted by a [`Transport`](crate::Transport).
///
/// Transports hold the sending half of an unbounded channel and push one of
/// these for every connection state change or inbound frame. The receiving
/// side processes them one at a time, in arrival order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection is open and frames may be written
    Connected,
    /// The connection attempt failed
    ConnectionFailed(TransportError),
    /// An open connection was lost or closed by the peer
    Disconnected(Option<TransportError>),
    /// A frame could not be written
    WriteError(TransportError),
    /// A text frame arrived
    Message(String),
    /// A pong frame arrived in response to a ping
    Pong,
}

impl TransportEvent {
    /// Short name of the event kind, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Connected => "connected",
            TransportEvent::ConnectionFailed(_) => "connection_failed",
            TransportEvent::Disconnected(_) => "disconnected",
            TransportEvent::WriteError(_) => "write_error",
            TransportEvent::Message(_) => "message",
            TransportEvent::Pong => "pong",
        }
    }
}
