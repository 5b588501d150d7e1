//! WebSocket transport built on `tokio-tungstenite`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Result, TransportError};
use crate::event::TransportEvent;
use crate::{PingCallback, Transport};

/// Work queued for the connection task.
enum Outbound {
    Text(String),
    Ping(Vec<u8>, Option<PingCallback>),
    Close,
}

/// The socket currently owned by the transport.
struct ActiveConnection {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

/// State shared between the transport handle and its connection task.
struct Shared {
    /// Bumped on every open/close; tasks from an older generation stay silent
    generation: AtomicU64,
    connected: AtomicBool,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn emit(&self, generation: u64, event: TransportEvent) {
        if self.is_current(generation) {
            // Ignore errors if the receiver is gone
            let _ = self.event_sender.send(event);
        }
    }
}

/// A [`Transport`] that speaks WebSocket text frames.
///
/// Every call returns immediately. Opening spawns a connection task on the
/// ambient tokio runtime which owns the socket: a writer half draining queued
/// frames and a reader half forwarding inbound frames as [`TransportEvent`]s.
///
/// # Example
///
/// ```no_run
/// use bayeux_transport::{Transport, TransportEvent, WebSocketTransport};
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), bayeux_transport::TransportError> {
///     let (tx, mut rx) = mpsc::unbounded_channel::<TransportEvent>();
///     let transport = WebSocketTransport::new("ws://localhost:8000/faye", tx)?;
///
///     transport.open_connection();
///     while let Some(event) = rx.recv().await {
///         if let TransportEvent::Connected = event {
///             transport.write(r#"{"channel":"/meta/handshake"}"#.to_string());
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct WebSocketTransport {
    url: String,
    shared: Arc<Shared>,
    current: Mutex<Option<ActiveConnection>>,
}

impl WebSocketTransport {
    /// Create a transport for the given `ws://` or `wss://` endpoint.
    ///
    /// No connection is made until [`Transport::open_connection`] is called.
    pub fn new(
        url: impl Into<String>,
        event_sender: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self> {
        let url = url.into();
        validate_url(&url)?;

        Ok(Self {
            url,
            shared: Arc::new(Shared {
                generation: AtomicU64::new(0),
                connected: AtomicBool::new(false),
                event_sender,
            }),
            current: Mutex::new(None),
        })
    }

    /// The endpoint this transport connects to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn current(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        // The guarded value is replaced wholesale, so a poisoned lock is still consistent
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Transport for WebSocketTransport {
    fn open_connection(&self) {
        self.close_connection();

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Cannot open WebSocket connection outside a tokio runtime: {}", e);
                self.shared.emit(
                    generation,
                    TransportEvent::ConnectionFailed(TransportError::Connect(e.to_string())),
                );
                return;
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tracing::info!("Opening WebSocket connection to {}", self.url);
        let task = runtime.spawn(run_connection(
            self.url.clone(),
            generation,
            Arc::clone(&self.shared),
            outbound_rx,
        ));

        *self.current() = Some(ActiveConnection {
            outbound: outbound_tx,
            task,
        });
    }

    fn close_connection(&self) {
        let Some(connection) = self.current().take() else {
            return;
        };

        // Silence the old task before asking it to close
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);

        tracing::debug!("Closing WebSocket connection to {}", self.url);
        if connection.outbound.send(Outbound::Close).is_err() {
            connection.task.abort();
        }
    }

    fn write(&self, text: String) {
        let queued = match self.current().as_ref() {
            Some(connection) if self.is_connected() => {
                connection.outbound.send(Outbound::Text(text)).is_ok()
            }
            _ => false,
        };

        if !queued {
            tracing::warn!("Dropping frame written while not connected");
            let _ = self
                .shared
                .event_sender
                .send(TransportEvent::WriteError(TransportError::NotConnected));
        }
    }

    fn ping(&self, payload: Vec<u8>, on_complete: Option<PingCallback>) {
        let queued = match self.current().as_ref() {
            Some(connection) if self.is_connected() => connection
                .outbound
                .send(Outbound::Ping(payload, on_complete))
                .is_ok(),
            _ => false,
        };

        if !queued {
            let _ = self
                .shared
                .event_sender
                .send(TransportEvent::WriteError(TransportError::NotConnected));
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(connection) = self.current().take() {
            connection.task.abort();
        }
    }
}

/// Check that `url` is an absolute `ws` or `wss` URL.
pub fn validate_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(TransportError::InvalidUrl(format!(
            "{url}: unsupported scheme '{other}', expected ws or wss"
        ))),
    }
}

/// Own one socket from connect to close.
async fn run_connection(
    url: String,
    generation: u64,
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!("WebSocket connection to {} failed: {}", url, e);
            shared.emit(
                generation,
                TransportEvent::ConnectionFailed(TransportError::Connect(e.to_string())),
            );
            return;
        }
    };

    if !shared.is_current(generation) {
        tracing::debug!("Connection to {} superseded before it opened", url);
        return;
    }

    shared.connected.store(true, Ordering::SeqCst);
    tracing::info!("WebSocket connected to {}", url);
    shared.emit(generation, TransportEvent::Connected);

    let (mut sink, mut source) = stream.split();

    // None means a locally requested close, which is not reported
    let ended: Option<Option<TransportError>> = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::warn!("WebSocket write failed: {}", e);
                        shared.emit(generation, TransportEvent::WriteError(e.into()));
                    }
                }
                Some(Outbound::Ping(payload, on_complete)) => {
                    match sink.send(Message::Ping(payload.into())).await {
                        Ok(()) => {
                            if let Some(on_complete) = on_complete {
                                on_complete();
                            }
                        }
                        Err(e) => shared.emit(generation, TransportEvent::WriteError(e.into())),
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    break None;
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    shared.emit(generation, TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Pong(_))) => shared.emit(generation, TransportEvent::Pong),
                Some(Ok(Message::Close(_))) | None => break Some(Some(TransportError::Closed)),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(Some(e.into())),
            },
        }
    };

    if shared.is_current(generation) {
        shared.connected.store(false, Ordering::SeqCst);
    }

    if let Some(error) = ended {
        tracing::info!("WebSocket connection to {} lost: {:?}", url, error);
        shared.emit(generation, TransportEvent::Disconnected(error));
    }
}
