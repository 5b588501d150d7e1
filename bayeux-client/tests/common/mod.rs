//! Helpers shared by the client integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bayeux_client::{BayeuxClient, ClientConfig, ClientEvent, EventChannelObserver, MemoryTransport};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const CLIENT_ID: &str = "abc";

/// A client wired to a memory transport, plus the stream of its notifications.
pub struct TestClient {
    pub client: BayeuxClient,
    pub transport: MemoryTransport,
    pub events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl TestClient {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = MemoryTransport::new(tx);
        let (observer, events) = EventChannelObserver::channel();

        let client = BayeuxClient::builder()
            .config(config)
            .transport(transport.clone(), rx)
            .observer(Arc::new(observer))
            .build()
            .expect("client should build");

        Self {
            client,
            transport,
            events,
        }
    }

    /// Connect and complete the handshake as [`CLIENT_ID`], returning every
    /// frame written along the way.
    pub async fn establish(&mut self) -> Vec<Value> {
        self.client.connect().unwrap();
        wait_for_frames(&self.transport, 1).await;

        self.transport.inject_text(format!(
            r#"{{"channel":"/meta/handshake","clientId":"{CLIENT_ID}","successful":true}}"#
        ));
        assert_eq!(self.next_event().await, ClientEvent::Connected);
        frames(self.transport.take_written())
    }

    pub fn inject(&self, text: &str) {
        self.transport.inject_text(text);
    }

    pub async fn next_event(&mut self) -> ClientEvent {
        timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("event channel closed")
    }

    /// Let the inbound lane catch up, then return what it produced.
    pub async fn drain_events(&mut self) -> Vec<ClientEvent> {
        settle().await;
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn take_frames(&self) -> Vec<Value> {
        frames(self.transport.take_written())
    }
}

pub fn frames(texts: Vec<String>) -> Vec<Value> {
    texts
        .iter()
        .map(|text| serde_json::from_str(text).expect("client wrote invalid JSON"))
        .collect()
}

pub fn on_channel<'a>(frames: &'a [Value], channel: &str) -> Vec<&'a Value> {
    frames.iter().filter(|f| f["channel"] == channel).collect()
}

pub fn subscriptions_in<'a>(frames: &'a [Value], meta: &str) -> Vec<&'a str> {
    on_channel(frames, meta)
        .into_iter()
        .filter_map(|f| f["subscription"].as_str())
        .collect()
}

/// Yield long enough for injected transport events to be applied.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub async fn wait_for_frames(transport: &MemoryTransport, count: usize) {
    timeout(Duration::from_secs(2), async {
        while transport.written().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for frames");
}
