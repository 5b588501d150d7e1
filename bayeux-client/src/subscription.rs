//! Subscription types shared by the registry and the client facade.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Callback invoked with the `data` of every message pushed on a channel.
pub type ChannelCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// A channel the application wants messages from.
///
/// Two subscriptions are the same entity when their channel names match.
#[derive(Debug, Clone)]
pub struct Subscription {
    channel: String,
    client_id: Option<String>,
    ext: Option<Map<String, Value>>,
}

impl Subscription {
    /// Create a subscription for `channel`.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            client_id: None,
            ext: None,
        }
    }

    /// Attach an extension map sent with the subscribe request.
    pub fn with_ext(mut self, ext: Map<String, Value>) -> Self {
        self.ext = Some(ext);
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The client id the subscribe request was issued under, once sent.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn ext(&self) -> Option<&Map<String, Value>> {
        self.ext.as_ref()
    }

    pub(crate) fn set_client_id(&mut self, client_id: &str) {
        self.client_id = Some(client_id.to_string());
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.channel == other.channel
    }
}

impl Eq for Subscription {}

impl From<&str> for Subscription {
    fn from(channel: &str) -> Self {
        Self::new(channel)
    }
}

impl From<String> for Subscription {
    fn from(channel: String) -> Self {
        Self::new(channel)
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.channel)
    }
}

/// Outcome of a subscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Already confirmed by the server; nothing was sent
    Subscribed,
    /// A request is already awaiting acknowledgment; nothing was sent
    Pending,
    /// No live session yet; the request is sent once the handshake completes
    Queued,
    /// A subscribe request was just sent
    Subscribing,
}

/// Lifecycle stage of a tracked subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Waiting for a live session
    Queued,
    /// Subscribe request sent, awaiting acknowledgment
    Pending,
    /// Confirmed by the server
    Open,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Queued => write!(f, "queued"),
            Stage::Pending => write!(f, "pending"),
            Stage::Open => write!(f, "open"),
        }
    }
}
