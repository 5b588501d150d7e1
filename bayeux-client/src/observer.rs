//! Application notification surface.
//!
//! The client reports everything that happens on the session through a
//! [`ClientObserver`]. Implement only the methods you care about; all of them
//! default to doing nothing. [`EventChannelObserver`] turns the notifications
//! into a stream of [`ClientEvent`]s instead.
//!
//! Notifications are delivered on the thread or task that caused them, after
//! every internal lock has been released, so an observer may call straight
//! back into the client.

use bayeux_transport::TransportError;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ClientError;

/// Receives session notifications. Return values never influence the protocol.
pub trait ClientObserver: Send + Sync {
    /// The handshake succeeded and the session has a client id.
    fn connected(&self) {}

    /// The session ended, either on request or because the transport dropped.
    fn disconnected(&self) {}

    /// The transport could not connect.
    fn connection_failed(&self, _error: &ClientError) {}

    /// A frame could not be written.
    fn write_error(&self, _error: &TransportError) {}

    /// The server confirmed a subscription.
    fn subscribed(&self, _channel: &str) {}

    /// The server confirmed an unsubscription.
    fn unsubscribed(&self, _channel: &str) {}

    /// The server rejected a request, or an inbound frame could not be used.
    fn failed(&self, _error: &ClientError) {}

    /// Data arrived on an open channel.
    fn received(&self, _channel: &str, _data: &Value) {}

    /// The transport saw a pong.
    fn received_pong(&self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ClientObserver for NoopObserver {}

/// One observer notification as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    ConnectionFailed(String),
    WriteError(TransportError),
    Subscribed(String),
    Unsubscribed(String),
    Failed(String),
    Received { channel: String, data: Value },
    ReceivedPong,
}

/// Forwards every notification into an unbounded channel.
///
/// Notifications sent after the receiver is dropped are discarded.
#[derive(Clone)]
pub struct EventChannelObserver {
    event_sender: mpsc::UnboundedSender<ClientEvent>,
}

impl EventChannelObserver {
    /// Create an observer that forwards to `event_sender`.
    pub fn new(event_sender: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self { event_sender }
    }

    /// Create an observer together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn forward(&self, event: ClientEvent) {
        if self.event_sender.send(event).is_err() {
            tracing::trace!("Client event receiver dropped");
        }
    }
}

impl ClientObserver for EventChannelObserver {
    fn connected(&self) {
        self.forward(ClientEvent::Connected);
    }

    fn disconnected(&self) {
        self.forward(ClientEvent::Disconnected);
    }

    fn connection_failed(&self, error: &ClientError) {
        self.forward(ClientEvent::ConnectionFailed(error.to_string()));
    }

    fn write_error(&self, error: &TransportError) {
        self.forward(ClientEvent::WriteError(error.clone()));
    }

    fn subscribed(&self, channel: &str) {
        self.forward(ClientEvent::Subscribed(channel.to_string()));
    }

    fn unsubscribed(&self, channel: &str) {
        self.forward(ClientEvent::Unsubscribed(channel.to_string()));
    }

    fn failed(&self, error: &ClientError) {
        self.forward(ClientEvent::Failed(error.to_string()));
    }

    fn received(&self, channel: &str, data: &Value) {
        self.forward(ClientEvent::Received {
            channel: channel.to_string(),
            data: data.clone(),
        });
    }

    fn received_pong(&self) {
        self.forward(ClientEvent::ReceivedPong);
    }
}

/// A notification collected while locks are held, delivered afterwards.
#[derive(Debug)]
pub(crate) enum Notification {
    Connected,
    Disconnected,
    ConnectionFailed(ClientError),
    WriteError(TransportError),
    Subscribed(String),
    Unsubscribed(String),
    Failed(ClientError),
    ReceivedPong,
}

impl Notification {
    pub(crate) fn deliver(&self, observer: &dyn ClientObserver) {
        match self {
            Notification::Connected => observer.connected(),
            Notification::Disconnected => observer.disconnected(),
            Notification::ConnectionFailed(error) => observer.connection_failed(error),
            Notification::WriteError(error) => observer.write_error(error),
            Notification::Subscribed(channel) => observer.subscribed(channel),
            Notification::Unsubscribed(channel) => observer.unsubscribed(channel),
            Notification::Failed(error) => observer.failed(error),
            Notification::ReceivedPong => observer.received_pong(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_noop_observer_accepts_everything() {
        let observer = NoopObserver;
        observer.connected();
        observer.subscribed("/foo/bar");
        observer.received("/foo/bar", &json!(1));
        observer.failed(&ClientError::LockPoisoned);
    }

    #[test]
    fn test_event_channel_forwards_in_order() {
        let (observer, mut rx) = EventChannelObserver::channel();

        observer.connected();
        observer.subscribed("/foo/bar");
        observer.received("/foo/bar", &json!({"n": 1}));
        observer.failed(&ClientError::SubscriptionRejected {
            channel: "/foo/baz".to_string(),
            error: "403::Denied".to_string(),
        });
        observer.write_error(&TransportError::NotConnected);

        assert_eq!(rx.try_recv().unwrap(), ClientEvent::Connected);
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientEvent::Subscribed("/foo/bar".to_string())
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientEvent::Received {
                channel: "/foo/bar".to_string(),
                data: json!({"n": 1}),
            }
        );
        match rx.try_recv().unwrap() {
            ClientEvent::Failed(message) => assert!(message.contains("403::Denied")),
            other => panic!("Expected Failed, got {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            ClientEvent::WriteError(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_event_channel_survives_dropped_receiver() {
        let (observer, rx) = EventChannelObserver::channel();
        drop(rx);
        observer.disconnected();
    }

    #[test]
    fn test_notification_delivery() {
        let (observer, mut rx) = EventChannelObserver::channel();

        Notification::Unsubscribed("/foo/bar".to_string()).deliver(&observer);
        Notification::ReceivedPong.deliver(&observer);

        assert_eq!(
            rx.try_recv().unwrap(),
            ClientEvent::Unsubscribed("/foo/bar".to_string())
        );
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::ReceivedPong);
    }
}
