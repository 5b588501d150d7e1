//! Duplex message transport for the bayeux client.
//!
//! This crate provides the seam between the Bayeux protocol core and the
//! network. It knows nothing about envelopes or channels: it moves text
//! frames in both directions and reports connection state changes.
//!
//! # Overview
//!
//! - [`Transport`]: the trait the protocol core writes through. Every method
//!   is non-blocking and fire-and-forget.
//! - [`TransportEvent`]: what a transport reports back (connected, failed,
//!   disconnected, write error, inbound text, pong), delivered over a
//!   `tokio::sync::mpsc` unbounded channel handed to the transport at
//!   construction.
//! - [`WebSocketTransport`]: the production implementation over
//!   `tokio-tungstenite`.
//! - [`MemoryTransport`]: an in-process implementation that records writes
//!   and lets the caller inject events.
//!
//! # Example
//!
//! ```no_run
//! use bayeux_transport::{Transport, TransportEvent, WebSocketTransport};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bayeux_transport::TransportError> {
//!     let (tx, mut rx) = mpsc::unbounded_channel::<TransportEvent>();
//!     let transport = WebSocketTransport::new("ws://localhost:8000/faye", tx)?;
//!     transport.open_connection();
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             TransportEvent::Connected => println!("connected"),
//!             TransportEvent::Message(text) => println!("received {text}"),
//!             TransportEvent::Disconnected(_) => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod event;
pub mod memory;
pub mod websocket;

pub use error::{Result, TransportError};
pub use event::TransportEvent;
pub use memory::MemoryTransport;
pub use websocket::WebSocketTransport;

/// Callback run once a ping frame has been handed to the socket.
pub type PingCallback = Box<dyn FnOnce() + Send + 'static>;

/// A persistent, message-oriented duplex channel.
///
/// Implementations report everything that happens on the channel through
/// [`TransportEvent`]s; none of these methods block or return errors.
pub trait Transport: Send + Sync {
    /// Start connecting. Any existing connection is closed first.
    ///
    /// Completion is reported as [`TransportEvent::Connected`] or
    /// [`TransportEvent::ConnectionFailed`].
    fn open_connection(&self);

    /// Close the current connection without reporting a disconnect.
    fn close_connection(&self);

    /// Queue a text frame.
    ///
    /// Failures are reported as [`TransportEvent::WriteError`].
    fn write(&self, text: String);

    /// Queue a ping frame, running `on_complete` once it has been sent.
    fn ping(&self, payload: Vec<u8>, on_complete: Option<PingCallback>);

    /// Whether frames can currently be written.
    fn is_connected(&self) -> bool;
}
