//! Bayeux protocol constants: meta-channels, connection types and channel rules.

use std::fmt;
use std::str::FromStr;

use crate::error::{ClientError, Result};

/// Protocol version sent in the handshake.
pub const BAYEUX_VERSION: &str = "1.0";

/// Oldest protocol version this client accepts.
pub const MINIMUM_VERSION: &str = "1.0beta";

/// Prefix shared by every meta-channel.
pub const META_PREFIX: &str = "/meta/";

/// The reserved channels used for session control.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum MetaChannel {
    Handshake,
    Connect,
    Disconnect,
    Subscribe,
    Unsubscribe,
}

impl MetaChannel {
    /// All meta-channels this client understands.
    pub const ALL: [MetaChannel; 5] = [
        MetaChannel::Handshake,
        MetaChannel::Connect,
        MetaChannel::Disconnect,
        MetaChannel::Subscribe,
        MetaChannel::Unsubscribe,
    ];

    /// The wire name of the channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaChannel::Handshake => "/meta/handshake",
            MetaChannel::Connect => "/meta/connect",
            MetaChannel::Disconnect => "/meta/disconnect",
            MetaChannel::Subscribe => "/meta/subscribe",
            MetaChannel::Unsubscribe => "/meta/unsubscribe",
        }
    }

    /// Look up a meta-channel by wire name.
    pub fn parse(channel: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|meta| meta.as_str() == channel)
    }
}

impl fmt::Display for MetaChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetaChannel {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| ClientError::InvalidChannel {
            channel: s.to_string(),
            reason: "not a known meta channel",
        })
    }
}

/// Connection types a Bayeux client may advertise.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ConnectionType {
    LongPolling,
    CallbackPolling,
    Iframe,
    WebSocket,
}

impl ConnectionType {
    /// Advertised during the handshake, in preference order.
    pub const SUPPORTED: [ConnectionType; 4] = [
        ConnectionType::LongPolling,
        ConnectionType::CallbackPolling,
        ConnectionType::Iframe,
        ConnectionType::WebSocket,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::LongPolling => "long-polling",
            ConnectionType::CallbackPolling => "callback-polling",
            ConnectionType::Iframe => "iframe",
            ConnectionType::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `channel` lives under `/meta/`.
pub fn is_meta_channel(channel: &str) -> bool {
    channel.starts_with(META_PREFIX)
}

/// Check that an application may subscribe or publish to `channel`.
pub fn validate_channel(channel: &str) -> Result<()> {
    let invalid = |reason| {
        Err(ClientError::InvalidChannel {
            channel: channel.to_string(),
            reason,
        })
    };

    if !channel.starts_with('/') {
        return invalid("channel names must start with '/'");
    }
    if channel.len() == 1 || channel.contains("//") {
        return invalid("channel segments must not be empty");
    }
    if is_meta_channel(channel) {
        return invalid("meta channels are reserved");
    }
    Ok(())
}

/// A Bayeux error string split into its parts.
///
/// Servers report errors as `code:args:message`, e.g. `403::Denied` or
/// `402:xj3sjdsjdsjad:Unknown Client ID`. Args are comma separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub code: Option<u16>,
    pub args: Vec<String>,
    pub message: String,
}

impl ErrorDetail {
    /// Parse an error string. Text that does not follow the format is kept
    /// whole as the message.
    pub fn parse(error: &str) -> Self {
        let mut parts = error.splitn(3, ':');
        let (Some(code), Some(args), Some(message)) = (parts.next(), parts.next(), parts.next())
        else {
            return Self::unstructured(error);
        };

        let Ok(code) = code.parse::<u16>() else {
            return Self::unstructured(error);
        };

        let args = if args.is_empty() {
            Vec::new()
        } else {
            args.split(',').map(str::to_string).collect()
        };

        Self {
            code: Some(code),
            args,
            message: message.to_string(),
        }
    }

    fn unstructured(error: &str) -> Self {
        Self {
            code: None,
            args: Vec::new(),
            message: error.to_string(),
        }
    }
}
