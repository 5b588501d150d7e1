//! # Bayeux Client
//!
//! A client for the Bayeux publish/subscribe protocol over a persistent
//! duplex transport (WebSocket by default).
//!
//! ## Overview
//!
//! The client turns application intents ("subscribe to `/foo/bar`", "publish
//! this payload") into correctly sequenced protocol envelopes, tracks every
//! subscription through its lifecycle, re-sends subscriptions the server has
//! not acknowledged, and clears its state when the transport goes away.
//!
//! ## Key Features
//!
//! - **Queued subscriptions**: subscribe before connecting; requests go out as
//!   soon as the handshake completes, in the order they were made
//! - **One entry per channel**: a channel is tracked in exactly one lifecycle
//!   stage at a time (queued, pending or open)
//! - **Retry of lost requests**: pending subscriptions are re-sent at a fixed
//!   interval while the session is live
//! - **Per-channel callbacks** alongside a [`ClientObserver`] for session
//!   notifications, or an [`EventChannelObserver`] to consume them as a stream
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bayeux_client::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> bayeux_client::Result<()> {
//! let (observer, mut events) = EventChannelObserver::channel();
//!
//! let client = BayeuxClient::builder()
//!     .url("ws://localhost:8000/faye")
//!     .observer(Arc::new(observer))
//!     .build()?;
//!
//! client.subscribe_with("/chat/lobby", |data| println!("lobby: {data}"))?;
//! client.connect()?;
//!
//! while let Some(event) = events.recv().await {
//!     if event == ClientEvent::Subscribed("/chat/lobby".to_string()) {
//!         client.publish("/chat/lobby", serde_json::json!({"text": "hello"}))?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Envelope codec** ([`envelope`]): protocol messages to and from JSON
//! - **Subscription registry** ([`registry`]): lifecycle stages under one lock
//! - **Session manager**: handshake, connect loop, disconnect and teardown
//! - **Message dispatcher**: routes inbound envelopes to the session, the
//!   registry, callbacks and the observer
//! - **Retry scheduler**: background re-submission of pending subscriptions
//!
//! Transport events are applied one at a time, in arrival order, by a
//! background task. Application calls that read session state and then send
//! are serialized against each other and against that task.

pub mod config;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod observer;
pub mod protocol;
pub mod registry;
pub mod subscription;

mod client;
mod dispatcher;
mod retry;
mod session;

// Re-export main types for convenience
pub use client::{BayeuxClient, ClientBuilder};
pub use config::ClientConfig;
pub use envelope::{Advice, Envelope};
pub use error::{ClientError, Result};
pub use observer::{ClientEvent, ClientObserver, EventChannelObserver, NoopObserver};
pub use protocol::{ErrorDetail, MetaChannel};
pub use registry::RegistrySnapshot;
pub use subscription::{ChannelCallback, Stage, Subscription, SubscriptionState};

// Re-export the transport seam so applications need only one dependency
pub use bayeux_transport::{
    MemoryTransport, PingCallback, Transport, TransportError, TransportEvent, WebSocketTransport,
};

/// Prelude module for convenient imports
///
/// ```rust
/// use bayeux_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BayeuxClient, ClientBuilder, ClientConfig, ClientError, ClientEvent, ClientObserver,
        EventChannelObserver, Result, Subscription, SubscriptionState,
    };
}
