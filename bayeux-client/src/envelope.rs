//! Envelope codec: protocol messages to and from wire text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::protocol::{ConnectionType, MetaChannel, BAYEUX_VERSION, MINIMUM_VERSION};

/// Server or client hints piggybacked on an envelope. Durations are milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<String>,
}

/// One Bayeux message, inbound or outbound.
///
/// Only `channel` is always present; everything else depends on the
/// meta-channel or on whether this is a request, a response or pushed data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub channel: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<Advice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_connection_types: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Map<String, Value>>,
}

impl Envelope {
    fn meta(channel: MetaChannel) -> Self {
        Self {
            channel: channel.as_str().to_string(),
            ..Default::default()
        }
    }

    /// `/meta/handshake` advertising every supported connection type.
    pub fn handshake() -> Self {
        Self {
            version: Some(BAYEUX_VERSION.to_string()),
            minimum_version: Some(MINIMUM_VERSION.to_string()),
            supported_connection_types: Some(
                ConnectionType::SUPPORTED
                    .iter()
                    .map(|c| c.as_str().to_string())
                    .collect(),
            ),
            ..Self::meta(MetaChannel::Handshake)
        }
    }

    /// `/meta/connect` over the websocket connection type.
    pub fn connect(client_id: &str, timeout_ms: u64) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            connection_type: Some(ConnectionType::WebSocket.as_str().to_string()),
            advice: Some(Advice {
                timeout: Some(timeout_ms),
                ..Default::default()
            }),
            ..Self::meta(MetaChannel::Connect)
        }
    }

    /// `/meta/disconnect` over the websocket connection type.
    pub fn disconnect(client_id: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            connection_type: Some(ConnectionType::WebSocket.as_str().to_string()),
            ..Self::meta(MetaChannel::Disconnect)
        }
    }

    /// `/meta/subscribe` for `subscription`, passing `ext` through untouched.
    pub fn subscribe(
        client_id: &str,
        subscription: &str,
        ext: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            subscription: Some(subscription.to_string()),
            ext,
            ..Self::meta(MetaChannel::Subscribe)
        }
    }

    /// `/meta/unsubscribe` for `subscription`.
    pub fn unsubscribe(client_id: &str, subscription: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            subscription: Some(subscription.to_string()),
            ..Self::meta(MetaChannel::Unsubscribe)
        }
    }

    /// A data message published to `channel`.
    pub fn publish(client_id: &str, channel: &str, id: String, data: Value) -> Self {
        Self {
            channel: channel.to_string(),
            client_id: Some(client_id.to_string()),
            id: Some(id),
            data: Some(data),
            ..Default::default()
        }
    }

    /// The meta-channel this envelope travels on, if any.
    pub fn meta_channel(&self) -> Option<MetaChannel> {
        MetaChannel::parse(&self.channel)
    }

    /// `true` only when the server explicitly reported success.
    pub fn is_successful(&self) -> bool {
        self.successful == Some(true)
    }
}

/// Serialize one envelope as a JSON object.
pub fn encode(envelope: &Envelope) -> Result<String> {
    Ok(serde_json::to_string(envelope)?)
}

/// Parse inbound text holding either one envelope or an array of them.
pub fn decode(text: &str) -> Result<Vec<Envelope>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Inbound {
        Batch(Vec<Envelope>),
        Single(Envelope),
    }

    Ok(match serde_json::from_str(text)? {
        Inbound::Batch(envelopes) => envelopes,
        Inbound::Single(envelope) => vec![envelope],
    })
}
