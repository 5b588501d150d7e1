//! The client facade and its builder.
//!
//! [`BayeuxClient`] owns the shared protocol state ([`Inner`]) and the two
//! background tasks that drive it: the inbound lane, which applies transport
//! events one at a time in arrival order, and the retry scheduler.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bayeux_transport::{PingCallback, Transport, TransportEvent, WebSocketTransport};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::envelope::{self, Advice, Envelope};
use crate::error::{ClientError, Result};
use crate::observer::{ClientObserver, NoopObserver, Notification};
use crate::protocol::validate_channel;
use crate::registry::{RegistrySnapshot, SubscriptionRegistry};
use crate::retry::RetryScheduler;
use crate::session::Session;
use crate::subscription::{ChannelCallback, Subscription, SubscriptionState};

/// State shared by the facade, the inbound lane and the retry scheduler.
///
/// Lock order is session, then registry. Operations that read session state
/// and then send hold the session lock for the whole read-mint-send sequence;
/// the registry lock is only ever held inside a single registry call.
pub(crate) struct Inner {
    pub(crate) config: ClientConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) observer: Arc<dyn ClientObserver>,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) session: Mutex<Session>,
}

impl Inner {
    pub(crate) fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn ClientObserver>,
    ) -> Self {
        Self {
            config,
            transport,
            observer,
            registry: SubscriptionRegistry::new(),
            session: Mutex::new(Session::default()),
        }
    }

    pub(crate) fn lock_session(&self) -> Result<MutexGuard<'_, Session>> {
        self.session.lock().map_err(|_| ClientError::LockPoisoned)
    }

    /// Encode `envelope` and hand it to the transport.
    pub(crate) fn send(&self, envelope: &Envelope) -> Result<()> {
        let text = envelope::encode(envelope)?;
        tracing::debug!("Sending {}: {}", envelope.channel, text);
        self.transport.write(text);
        Ok(())
    }

    /// Like [`send`](Self::send) for sends with no caller to report to.
    pub(crate) fn send_or_log(&self, envelope: &Envelope) {
        if let Err(e) = self.send(envelope) {
            tracing::error!("Dropping {} envelope: {}", envelope.channel, e);
        }
    }

    /// Send a subscribe request for `subscription` and track it as pending.
    pub(crate) fn request_subscription(&self, subscription: Subscription, client_id: &str) {
        let envelope = Envelope::subscribe(
            client_id,
            subscription.channel(),
            subscription.ext().cloned(),
        );
        if let Err(e) = self.registry.mark_pending(subscription, client_id) {
            tracing::error!("Failed to track {} as pending: {}", envelope.channel, e);
            return;
        }
        self.send_or_log(&envelope);
    }

    pub(crate) fn notify(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            notification.deliver(self.observer.as_ref());
        }
    }

    pub(crate) fn subscribe(
        &self,
        subscription: Subscription,
        callback: Option<ChannelCallback>,
    ) -> Result<SubscriptionState> {
        validate_channel(subscription.channel())?;

        let session = self.lock_session()?;
        if session.is_disconnecting() {
            tracing::warn!(
                "Refusing subscription to {} while disconnecting",
                subscription.channel()
            );
            return Err(ClientError::DisconnectInProgress { operation: "subscribe" });
        }
        let client_id = session.live_client_id();
        let envelope = client_id.map(|client_id| {
            Envelope::subscribe(client_id, subscription.channel(), subscription.ext().cloned())
        });
        let channel = subscription.channel().to_string();

        let state = self.registry.admit(subscription, callback, client_id)?;
        match (state, envelope) {
            (SubscriptionState::Subscribing, Some(envelope)) => {
                tracing::info!("Subscribing to {}", channel);
                self.send(&envelope)?;
            }
            (SubscriptionState::Queued, _) => {
                tracing::debug!("Queued subscription to {} until handshake", channel);
            }
            (state, _) => {
                tracing::debug!("Subscription to {} already {:?}", channel, state);
            }
        }
        Ok(state)
    }

    pub(crate) fn unsubscribe(&self, channel: &str) -> Result<()> {
        validate_channel(channel)?;

        let session = self.lock_session()?;
        let previous = self.registry.remove(channel)?;
        tracing::debug!(
            "Removed {} from registry (was {})",
            channel,
            previous.map_or("untracked".to_string(), |stage| stage.to_string())
        );

        match session.client_id() {
            Some(client_id) => {
                tracing::info!("Unsubscribing from {}", channel);
                self.send(&Envelope::unsubscribe(client_id, channel))
            }
            None => Ok(()),
        }
    }

    pub(crate) fn publish(&self, channel: &str, data: Value) -> Result<String> {
        validate_channel(channel)?;

        let mut session = self.lock_session()?;
        let Some(client_id) = session.live_client_id().map(str::to_owned) else {
            tracing::warn!("Publish to {} suppressed: no live session", channel);
            return Err(ClientError::MissingSessionIdentity {
                operation: "publish",
            });
        };

        let id = session.next_message_id();
        self.send(&Envelope::publish(&client_id, channel, id.clone(), data))?;
        Ok(id)
    }
}

/// Forward transport events to `inner` until either side goes away.
async fn run_inbound_lane(
    inner: Weak<Inner>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_transport_event(event);
    }
    tracing::debug!("Inbound lane stopped");
}

/// Builder for [`BayeuxClient`].
///
/// # Example
///
/// ```no_run
/// use bayeux_client::BayeuxClient;
///
/// # #[tokio::main]
/// # async fn main() -> bayeux_client::Result<()> {
/// let client = BayeuxClient::builder()
///     .url("ws://localhost:8000/faye")
///     .initial_channel("/chat/lobby")
///     .build()?;
/// client.connect()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    observer: Arc<dyn ClientObserver>,
    transport: Option<(Arc<dyn Transport>, mpsc::UnboundedReceiver<TransportEvent>)>,
    initial_channels: Vec<Subscription>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            config: ClientConfig::default(),
            observer: Arc::new(NoopObserver),
            transport: None,
            initial_channels: Vec::new(),
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server endpoint for the built-in WebSocket transport.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = Some(url.into());
        self
    }

    /// Replace the configuration. A url set earlier is kept if `config` has none.
    pub fn config(mut self, config: ClientConfig) -> Self {
        let url = self.config.url.take();
        self.config = config;
        if self.config.url.is_none() {
            self.config.url = url;
        }
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ClientObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Use `transport` instead of a WebSocket. `events` must receive what the
    /// transport reports.
    pub fn transport<T>(mut self, transport: T, events: mpsc::UnboundedReceiver<TransportEvent>) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some((Arc::new(transport), events));
        self
    }

    /// Queue a subscription before the client exists.
    pub fn initial_channel(mut self, channel: impl Into<String>) -> Self {
        self.initial_channels.push(Subscription::new(channel));
        self
    }

    /// Validate the configuration and start the client's background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<BayeuxClient> {
        self.config.validate()?;

        let runtime = Handle::try_current().map_err(|_| {
            ClientError::Configuration("BayeuxClient must be built inside a tokio runtime".to_string())
        })?;

        let (transport, events) = match self.transport {
            Some(supplied) => supplied,
            None => {
                let url = self.config.url.clone().ok_or_else(|| {
                    ClientError::Configuration("A url is required without a custom transport".to_string())
                })?;
                let (tx, rx) = mpsc::unbounded_channel();
                let transport: Arc<dyn Transport> = Arc::new(WebSocketTransport::new(url, tx)?);
                (transport, rx)
            }
        };

        let retry_interval = self.config.retry_interval;
        let inner = Arc::new(Inner::new(self.config, transport, self.observer));

        for subscription in self.initial_channels {
            validate_channel(subscription.channel())?;
            inner.registry.admit(subscription, None, None)?;
        }

        let inbound_task = runtime.spawn(run_inbound_lane(Arc::downgrade(&inner), events));
        let retry = RetryScheduler::start(&runtime, Arc::downgrade(&inner), retry_interval);

        tracing::info!(
            "Bayeux client ready ({} queued subscriptions)",
            inner.registry.len()
        );

        Ok(BayeuxClient {
            inner,
            inbound_task: Some(inbound_task),
            retry: Some(retry),
        })
    }
}

/// A Bayeux client session.
///
/// All methods are non-blocking: requests are written to the transport and
/// their outcomes are reported to the [`ClientObserver`].
pub struct BayeuxClient {
    inner: Arc<Inner>,
    inbound_task: Option<JoinHandle<()>>,
    retry: Option<RetryScheduler>,
}

impl BayeuxClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client for `url` with default settings and no observer.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::builder().url(url).build()
    }

    /// Open the transport and handshake. Does nothing while an attempt or a
    /// session is already underway. After a rejected handshake the open
    /// transport is reused and the handshake is sent again.
    ///
    /// Fails with [`ClientError::DisconnectInProgress`] until the server has
    /// answered an earlier [`disconnect`](Self::disconnect).
    pub fn connect(&self) -> Result<()> {
        self.inner.connect()
    }

    /// End the session. Every tracked subscription is unsubscribed first.
    pub fn disconnect(&self) -> Result<()> {
        let notifications = self.inner.disconnect()?;
        self.inner.notify(notifications);
        Ok(())
    }

    /// Subscribe to `channel` without a per-channel callback.
    ///
    /// Refused with [`ClientError::DisconnectInProgress`] between
    /// [`disconnect`](Self::disconnect) and the server's answer.
    pub fn subscribe(&self, channel: &str) -> Result<SubscriptionState> {
        self.inner.subscribe(Subscription::new(channel), None)
    }

    /// Subscribe to `channel`, calling `callback` with the data of every
    /// message pushed on it. A later call for the same channel replaces the
    /// callback.
    pub fn subscribe_with<F>(&self, channel: &str, callback: F) -> Result<SubscriptionState>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner
            .subscribe(Subscription::new(channel), Some(Arc::new(callback)))
    }

    /// Subscribe with a fully specified [`Subscription`], e.g. one carrying an
    /// extension map.
    pub fn subscribe_to(
        &self,
        subscription: Subscription,
        callback: Option<ChannelCallback>,
    ) -> Result<SubscriptionState> {
        self.inner.subscribe(subscription, callback)
    }

    /// Stop tracking `channel` and tell the server, if there is a session.
    pub fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.inner.unsubscribe(channel)
    }

    /// Publish `data` on `channel`, returning the message id.
    pub fn publish(&self, channel: &str, data: Value) -> Result<String> {
        self.inner.publish(channel, data)
    }

    /// Send a transport-level ping.
    pub fn ping(&self, payload: Vec<u8>, on_complete: Option<PingCallback>) {
        self.inner.transport.ping(payload, on_complete);
    }

    /// Whether the server has confirmed `channel`.
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.inner.registry.is_open(channel)
    }

    /// Whether a handshake has completed and the session is live.
    pub fn is_connected(&self) -> bool {
        self.inner
            .lock_session()
            .map(|session| session.is_connected())
            .unwrap_or(false)
    }

    /// Whether the transport itself is open.
    pub fn is_transport_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    /// The client id issued at handshake.
    pub fn client_id(&self) -> Option<String> {
        self.inner
            .lock_session()
            .ok()
            .and_then(|session| session.client_id().map(str::to_owned))
    }

    /// Advice the server sent with its handshake response.
    pub fn server_advice(&self) -> Option<Advice> {
        self.inner
            .lock_session()
            .ok()
            .and_then(|session| session.advice().cloned())
    }

    /// Channels per lifecycle stage.
    pub fn subscriptions(&self) -> Result<RegistrySnapshot> {
        self.inner.registry.snapshot()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Stop the background tasks and close the transport.
    ///
    /// The retry scheduler gets up to `shutdown_timeout` to stop.
    pub async fn shutdown(mut self) -> Result<()> {
        tracing::info!("Shutting down Bayeux client");

        let result = match self.retry.take() {
            Some(retry) => retry.shutdown(self.inner.config.shutdown_timeout).await,
            None => Ok(()),
        };

        if let Some(task) = self.inbound_task.take() {
            task.abort();
        }
        self.inner.transport.close_connection();

        result
    }
}

impl Drop for BayeuxClient {
    fn drop(&mut self) {
        if let Some(task) = self.inbound_task.take() {
            task.abort();
        }
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bayeux_transport::MemoryTransport;
    use serde_json::json;

    fn inner_with_memory() -> (Inner, MemoryTransport) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = MemoryTransport::new(tx);
        let inner = Inner::new(
            ClientConfig::default(),
            Arc::new(transport.clone()),
            Arc::new(NoopObserver),
        );
        (inner, transport)
    }

    fn establish(inner: &Inner, client_id: &str) {
        let mut session = inner.lock_session().unwrap();
        session.establish(client_id.to_string(), None);
    }

    #[test]
    fn test_subscribe_before_handshake_queues_silently() {
        let (inner, transport) = inner_with_memory();

        let state = inner.subscribe("/foo/bar".into(), None).unwrap();

        assert_eq!(state, SubscriptionState::Queued);
        assert!(transport.written().is_empty());
    }

    #[test]
    fn test_subscribe_with_session_sends_request() {
        let (inner, transport) = inner_with_memory();
        establish(&inner, "abc");

        let state = inner.subscribe("/foo/bar".into(), None).unwrap();

        assert_eq!(state, SubscriptionState::Subscribing);
        let written = transport.written();
        assert_eq!(written.len(), 1);
        let sent: Value = serde_json::from_str(&written[0]).unwrap();
        assert_eq!(sent["channel"], "/meta/subscribe");
        assert_eq!(sent["clientId"], "abc");
        assert_eq!(sent["subscription"], "/foo/bar");
    }

    #[test]
    fn test_subscribe_rejects_meta_channel() {
        let (inner, transport) = inner_with_memory();
        establish(&inner, "abc");

        let result = inner.subscribe("/meta/connect".into(), None);

        assert!(matches!(result, Err(ClientError::InvalidChannel { .. })));
        assert!(transport.written().is_empty());
    }

    #[test]
    fn test_unsubscribe_without_session_sends_nothing() {
        let (inner, transport) = inner_with_memory();
        inner.subscribe("/foo/bar".into(), None).unwrap();

        inner.unsubscribe("/foo/bar").unwrap();
        inner.unsubscribe("/foo/bar").unwrap();

        assert!(inner.registry.is_empty());
        assert!(transport.written().is_empty());
    }

    #[test]
    fn test_publish_requires_session() {
        let (inner, transport) = inner_with_memory();

        let result = inner.publish("/chat/room", json!("hi"));

        assert!(matches!(
            result,
            Err(ClientError::MissingSessionIdentity { operation: "publish" })
        ));
        assert!(transport.written().is_empty());
    }

    #[test]
    fn test_publish_mints_increasing_ids() {
        let (inner, transport) = inner_with_memory();
        establish(&inner, "abc");

        let first = inner.publish("/chat/room", json!("one")).unwrap();
        let second = inner.publish("/chat/room", json!("two")).unwrap();

        assert_eq!(first, "1");
        assert_eq!(second, "2");
        assert_eq!(transport.written().len(), 2);
    }

    #[test]
    fn test_build_requires_runtime() {
        let (tx, rx) = mpsc::unbounded_channel();
        let result = BayeuxClient::builder()
            .transport(MemoryTransport::new(tx), rx)
            .build();
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_build_requires_url_without_transport() {
        let result = BayeuxClient::builder().build();
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_build_rejects_bad_url() {
        let result = BayeuxClient::new("http://localhost/faye");
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_builder_config_keeps_url() {
        let client = BayeuxClient::builder()
            .url("ws://127.0.0.1:1/faye")
            .config(ClientConfig::new().with_retry_interval(std::time::Duration::from_secs(5)))
            .initial_channel("/foo/bar")
            .build()
            .unwrap();

        assert_eq!(client.config().url.as_deref(), Some("ws://127.0.0.1:1/faye"));
        assert_eq!(client.subscriptions().unwrap().queued, vec!["/foo/bar"]);
        assert!(!client.is_connected());
        assert!(!client.is_transport_connected());
    }
}
