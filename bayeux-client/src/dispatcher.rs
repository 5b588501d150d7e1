//! Inbound message routing.
//!
//! Transport events arrive here one at a time from the inbound lane. Meta
//! channel responses update the session and registry; data messages reach
//! the per-channel callback and the observer. Observer notifications are
//! collected while locks are held and delivered once they are released.

use bayeux_transport::TransportEvent;
use serde_json::Value;

use crate::client::Inner;
use crate::envelope::{self, Envelope};
use crate::error::{ClientError, Result};
use crate::observer::Notification;
use crate::protocol::{is_meta_channel, MetaChannel};
use crate::registry::Acknowledgment;

impl Inner {
    pub(crate) fn handle_transport_event(&self, event: TransportEvent) {
        tracing::trace!("Transport event: {}", event.kind());

        let notifications = match event {
            TransportEvent::Connected => self.on_transport_connected(),
            TransportEvent::ConnectionFailed(error) => {
                tracing::error!("Transport connection failed: {}", error);
                self.on_transport_lost().map(|()| {
                    vec![Notification::ConnectionFailed(ClientError::TransportFailure(
                        error.to_string(),
                    ))]
                })
            }
            TransportEvent::Disconnected(error) => {
                match &error {
                    Some(error) => tracing::warn!("Transport disconnected: {}", error),
                    None => tracing::info!("Transport disconnected"),
                }
                self.on_transport_lost()
                    .map(|()| vec![Notification::Disconnected])
            }
            TransportEvent::WriteError(error) => {
                tracing::warn!("Transport write failed: {}", error);
                Ok(vec![Notification::WriteError(error)])
            }
            TransportEvent::Message(text) => {
                self.handle_text(&text);
                Ok(Vec::new())
            }
            TransportEvent::Pong => Ok(vec![Notification::ReceivedPong]),
        };

        match notifications {
            Ok(notifications) => self.notify(notifications),
            Err(e) => {
                tracing::error!("Failed to apply transport event: {}", e);
                self.notify(vec![Notification::Failed(e)]);
            }
        }
    }

    /// Decode an inbound frame and dispatch every envelope in it, in order.
    fn handle_text(&self, text: &str) {
        let envelopes = match envelope::decode(text) {
            Ok(envelopes) => envelopes,
            Err(e) => {
                tracing::warn!("Discarding undecodable frame: {} ({})", e, text);
                self.notify(vec![Notification::Failed(e)]);
                return;
            }
        };

        for envelope in envelopes {
            self.dispatch(envelope);
        }
    }

    pub(crate) fn dispatch(&self, envelope: Envelope) {
        tracing::debug!("Received message on {}", envelope.channel);

        let result = match envelope.meta_channel() {
            Some(MetaChannel::Handshake) => self.handle_handshake_response(envelope),
            Some(MetaChannel::Connect) => self.handle_connect_response(envelope),
            Some(MetaChannel::Disconnect) => self.handle_disconnect_response(envelope),
            Some(MetaChannel::Subscribe) => self.handle_subscribe_response(envelope),
            Some(MetaChannel::Unsubscribe) => self.handle_unsubscribe_response(envelope),
            None if is_meta_channel(&envelope.channel) => {
                tracing::warn!("Ignoring unknown meta channel {}", envelope.channel);
                Ok(Vec::new())
            }
            None => {
                self.deliver_data(envelope);
                Ok(Vec::new())
            }
        };

        match result {
            Ok(notifications) => self.notify(notifications),
            Err(e) => {
                tracing::error!("Failed to handle inbound message: {}", e);
                self.notify(vec![Notification::Failed(e)]);
            }
        }
    }

    fn handle_subscribe_response(&self, envelope: Envelope) -> Result<Vec<Notification>> {
        let Some(channel) = envelope.subscription else {
            tracing::warn!("Subscribe response without a subscription field");
            return Ok(Vec::new());
        };

        let _session = self.lock_session()?;

        if envelope.successful != Some(true) {
            let error = envelope
                .error
                .unwrap_or_else(|| "unknown error".to_string());
            let was_pending = self.registry.reject(&channel)?;
            let rejection = ClientError::SubscriptionRejected { channel, error };
            tracing::warn!(
                "{} (code {:?}, was pending: {})",
                rejection,
                rejection.error_detail().and_then(|detail| detail.code),
                was_pending
            );
            return Ok(vec![Notification::Failed(rejection)]);
        }

        match self.registry.acknowledge(&channel)? {
            Acknowledgment::Opened => {
                tracing::info!("Subscribed to {}", channel);
                Ok(vec![Notification::Subscribed(channel)])
            }
            Acknowledgment::AlreadyOpen => {
                tracing::debug!("Duplicate subscribe acknowledgment for {}", channel);
                Ok(Vec::new())
            }
            Acknowledgment::Untracked => {
                tracing::debug!("Subscribe acknowledgment for untracked {}", channel);
                Ok(Vec::new())
            }
        }
    }

    fn handle_unsubscribe_response(&self, envelope: Envelope) -> Result<Vec<Notification>> {
        let Some(channel) = envelope.subscription else {
            tracing::warn!("Unsubscribe response without a subscription field");
            return Ok(Vec::new());
        };

        if envelope.successful == Some(false) {
            tracing::warn!(
                "Unsubscribe from {} unsuccessful: {}",
                channel,
                envelope.error.as_deref().unwrap_or("no error given")
            );
            return Ok(Vec::new());
        }

        let _session = self.lock_session()?;
        self.registry.close(&channel)?;
        tracing::info!("Unsubscribed from {}", channel);
        Ok(vec![Notification::Unsubscribed(channel)])
    }

    /// Hand a data message to its callback and the observer. No locks are
    /// held while either runs.
    fn deliver_data(&self, envelope: Envelope) {
        let channel = envelope.channel;

        if !self.registry.is_open(&channel) {
            tracing::debug!("Dropping message on {}: not subscribed", channel);
            return;
        }

        let data = match envelope.data {
            Some(Value::Null) | None => {
                tracing::debug!("Dropping message on {}: no data", channel);
                return;
            }
            Some(data) => data,
        };

        if let Some(callback) = self.registry.callback(&channel) {
            callback(&data);
        }
        self.observer.received(&channel, &data);
    }
}
