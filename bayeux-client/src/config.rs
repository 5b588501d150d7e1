//! Configuration types for the bayeux-client crate
//!
//! This module defines the settings that control session timing: the timeout
//! advice sent with every connect request, how often unacknowledged
//! subscriptions are re-sent, and how long shutdown may take.

use std::time::Duration;

use bayeux_transport::websocket::validate_url;

use crate::error::{ClientError, Result};

/// Configuration for a [`BayeuxClient`](crate::BayeuxClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server endpoint (`ws://` or `wss://`)
    /// Default: none; required unless a transport is supplied to the builder
    pub url: Option<String>,

    /// Timeout advice sent with every `/meta/connect`
    /// Default: 10 seconds
    pub timeout_advice: Duration,

    /// How often subscriptions still awaiting acknowledgment are re-sent
    /// Default: 45 seconds
    pub retry_interval: Duration,

    /// Upper bound on waiting for the retry scheduler to stop
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_advice: Duration::from_secs(10),
            retry_interval: Duration::from_secs(45),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Create a new ClientConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout advice in whole milliseconds, as sent on the wire.
    pub fn timeout_advice_ms(&self) -> u64 {
        u64::try_from(self.timeout_advice.as_millis()).unwrap_or(u64::MAX)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.url {
            validate_url(url).map_err(|e| ClientError::Configuration(e.to_string()))?;
        }

        if self.timeout_advice == Duration::ZERO {
            return Err(ClientError::Configuration(
                "Timeout advice must be greater than 0".to_string(),
            ));
        }

        if self.retry_interval == Duration::ZERO {
            return Err(ClientError::Configuration(
                "Retry interval must be greater than 0".to_string(),
            ));
        }

        if self.shutdown_timeout == Duration::ZERO {
            return Err(ClientError::Configuration(
                "Shutdown timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_timeout_advice(mut self, timeout: Duration) -> Self {
        self.timeout_advice = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
