//! In-process transport that records frames instead of sending them.
//!
//! Useful for driving a client without a network, either in tests or when the
//! application bridges frames over a channel this crate does not know about.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::event::TransportEvent;
use crate::{PingCallback, Transport};

/// A [`Transport`] backed by memory.
///
/// Written frames are appended to an internal log. Connection state changes
/// only when asked: either through `auto_connect` on open, or by injecting
/// events with [`MemoryTransport::inject`].
#[derive(Clone)]
pub struct MemoryTransport {
    event_sender: mpsc::UnboundedSender<TransportEvent>,
    written: Arc<Mutex<Vec<String>>>,
    connected: Arc<AtomicBool>,
    auto_connect: Arc<AtomicBool>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MemoryTransport {
    /// Create a transport that reports events on `event_sender`.
    ///
    /// By default `open_connection` emits [`TransportEvent::Connected`] straight away.
    pub fn new(event_sender: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            event_sender,
            written: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(false)),
            auto_connect: Arc::new(AtomicBool::new(true)),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Control whether `open_connection` emits `Connected` by itself.
    pub fn set_auto_connect(&self, enabled: bool) {
        self.auto_connect.store(enabled, Ordering::SeqCst);
    }

    /// Push an event to the owner as if it came from the network.
    ///
    /// Connection events also update [`Transport::is_connected`].
    pub fn inject(&self, event: TransportEvent) {
        match &event {
            TransportEvent::Connected => self.connected.store(true, Ordering::SeqCst),
            TransportEvent::ConnectionFailed(_) | TransportEvent::Disconnected(_) => {
                self.connected.store(false, Ordering::SeqCst)
            }
            _ => {}
        }
        let _ = self.event_sender.send(event);
    }

    /// Convenience for injecting an inbound text frame.
    pub fn inject_text(&self, text: impl Into<String>) {
        self.inject(TransportEvent::Message(text.into()));
    }

    /// Every frame written so far, oldest first.
    pub fn written(&self) -> Vec<String> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Remove and return every frame written so far.
    pub fn take_written(&self) -> Vec<String> {
        self.written
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default()
    }

    /// Number of `open_connection` calls.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of `close_connection` calls.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MemoryTransport {
    fn open_connection(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.auto_connect.load(Ordering::SeqCst) {
            self.inject(TransportEvent::Connected);
        }
    }

    fn close_connection(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn write(&self, text: String) {
        if let Ok(mut written) = self.written.lock() {
            written.push(text);
        }
    }

    fn ping(&self, _payload: Vec<u8>, on_complete: Option<PingCallback>) {
        if !self.is_connected() {
            let _ = self
                .event_sender
                .send(TransportEvent::WriteError(TransportError::NotConnected));
            return;
        }
        if let Some(on_complete) = on_complete {
            on_complete();
        }
        let _ = self.event_sender.send(TransportEvent::Pong);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
