//! Session state and handshake/connect/disconnect sequencing.

use crate::client::Inner;
use crate::envelope::{Advice, Envelope};
use crate::error::{ClientError, Result};
use crate::observer::Notification;

/// One logical connection to a Bayeux server.
#[derive(Debug, Default)]
pub(crate) struct Session {
    client_id: Option<String>,
    connected: bool,
    /// `connect()` opened the transport and it has not reported back yet.
    connection_initiated: bool,
    /// A handshake is on the wire without a response.
    handshaking: bool,
    /// A disconnect is on the wire without a response.
    disconnecting: bool,
    advice: Option<Advice>,
    message_sequence: u32,
}

impl Session {
    /// The client id, whether or not the session is still live.
    pub(crate) fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// The client id, only while the session is live.
    pub(crate) fn live_client_id(&self) -> Option<&str> {
        if self.connected {
            self.client_id()
        } else {
            None
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn is_disconnecting(&self) -> bool {
        self.disconnecting
    }

    /// An attempt to open the transport or complete a handshake is under way.
    fn attempt_in_flight(&self) -> bool {
        self.connection_initiated || self.handshaking
    }

    pub(crate) fn advice(&self) -> Option<&Advice> {
        self.advice.as_ref()
    }

    pub(crate) fn establish(&mut self, client_id: String, advice: Option<Advice>) {
        self.client_id = Some(client_id);
        self.connected = true;
        self.advice = advice;
    }

    /// Forget the session. The message counter keeps running so ids from an
    /// earlier session are not immediately reused.
    pub(crate) fn reset(&mut self) {
        self.client_id = None;
        self.connected = false;
        self.connection_initiated = false;
        self.handshaking = false;
        self.disconnecting = false;
        self.advice = None;
    }

    /// Mint the next publish id. Wraps to zero just before `u32::MAX`.
    pub(crate) fn next_message_id(&mut self) -> String {
        let next = self.message_sequence.saturating_add(1);
        self.message_sequence = if next >= u32::MAX { 0 } else { next };
        self.message_sequence.to_string()
    }
}

impl Inner {
    /// Open the transport, or handshake again over one that is already open.
    ///
    /// Does nothing while the session is live or an attempt is still under
    /// way.
    pub(crate) fn connect(&self) -> Result<()> {
        let mut session = self.lock_session()?;
        if session.disconnecting {
            return Err(ClientError::DisconnectInProgress { operation: "connect" });
        }
        if session.is_connected() {
            tracing::debug!("Session already connected, ignoring connect");
            return Ok(());
        }
        if session.attempt_in_flight() {
            tracing::debug!("Connection already initiated, ignoring connect");
            return Ok(());
        }

        if self.transport.is_connected() {
            tracing::info!("Transport already open, sending handshake");
            self.send(&Envelope::handshake())?;
            session.handshaking = true;
            return Ok(());
        }

        session.connection_initiated = true;
        tracing::info!("Opening transport connection");
        self.transport.open_connection();
        Ok(())
    }

    /// Unsubscribe everything and ask the server to end the session.
    ///
    /// Without a client id there is nothing to tell the server, so the
    /// transport is closed straight away.
    pub(crate) fn disconnect(&self) -> Result<Vec<Notification>> {
        let mut session = self.lock_session()?;

        if session.disconnecting {
            tracing::debug!("Disconnect already requested, ignoring disconnect");
            return Ok(Vec::new());
        }

        let Some(client_id) = session.client_id().map(str::to_owned) else {
            let was_initiated = session.attempt_in_flight() || self.transport.is_connected();
            self.teardown(&mut session)?;
            self.transport.close_connection();
            tracing::info!("Disconnected before handshake completed");
            return Ok(if was_initiated {
                vec![Notification::Disconnected]
            } else {
                Vec::new()
            });
        };

        let unsubscribed = self.unsubscribe_all(&client_id)?;
        session.connected = false;
        session.disconnecting = true;
        tracing::info!(
            "Disconnecting session {} ({} subscriptions released)",
            client_id,
            unsubscribed
        );
        self.send(&Envelope::disconnect(&client_id))?;
        Ok(Vec::new())
    }

    pub(crate) fn on_transport_connected(&self) -> Result<Vec<Notification>> {
        let mut session = self.lock_session()?;
        session.connection_initiated = false;
        session.handshaking = true;
        tracing::info!("Transport connected, sending handshake");
        self.send(&Envelope::handshake())?;
        Ok(Vec::new())
    }

    /// The transport failed to connect or dropped; the session cannot survive it.
    pub(crate) fn on_transport_lost(&self) -> Result<()> {
        let mut session = self.lock_session()?;
        self.teardown(&mut session)
    }

    pub(crate) fn handle_handshake_response(&self, envelope: Envelope) -> Result<Vec<Notification>> {
        let mut session = self.lock_session()?;
        session.handshaking = false;

        if !envelope.is_successful() {
            let error = envelope
                .error
                .unwrap_or_else(|| "handshake unsuccessful".to_string());
            tracing::warn!("Handshake rejected: {}", error);
            return Ok(vec![Notification::Failed(ClientError::HandshakeRejected(error))]);
        }

        let Some(client_id) = envelope.client_id.filter(|id| !id.is_empty()) else {
            tracing::warn!("Handshake response carried no clientId");
            return Ok(vec![Notification::Failed(ClientError::HandshakeRejected(
                "missing clientId".to_string(),
            ))]);
        };

        tracing::info!("Handshake successful, client id {}", client_id);
        session.establish(client_id.clone(), envelope.advice);

        self.send(&Envelope::connect(&client_id, self.config.timeout_advice_ms()))?;

        let queued = self.registry.drain_queued()?;
        if !queued.is_empty() {
            tracing::info!("Sending {} queued subscriptions", queued.len());
        }
        for subscription in queued {
            self.request_subscription(subscription, &client_id);
        }

        Ok(vec![Notification::Connected])
    }

    pub(crate) fn handle_connect_response(&self, envelope: Envelope) -> Result<Vec<Notification>> {
        let mut session = self.lock_session()?;

        if !envelope.is_successful() {
            let error = envelope
                .error
                .unwrap_or_else(|| "connect unsuccessful".to_string());
            tracing::warn!("Connect rejected: {}", error);
            return Ok(vec![Notification::Failed(ClientError::ConnectRejected(error))]);
        }

        if session.disconnecting {
            tracing::debug!("Ignoring connect response while disconnecting");
            return Ok(Vec::new());
        }

        let Some(client_id) = session.client_id().map(str::to_owned) else {
            tracing::debug!("Ignoring connect response without a session");
            return Ok(Vec::new());
        };

        session.connected = true;
        self.send(&Envelope::connect(&client_id, self.config.timeout_advice_ms()))?;
        Ok(Vec::new())
    }

    pub(crate) fn handle_disconnect_response(
        &self,
        envelope: Envelope,
    ) -> Result<Vec<Notification>> {
        let mut session = self.lock_session()?;

        if !envelope.is_successful() {
            tracing::warn!(
                "Disconnect unsuccessful: {}",
                envelope.error.as_deref().unwrap_or("no error given")
            );
            return Ok(Vec::new());
        }

        self.teardown(&mut session)?;
        self.transport.close_connection();
        tracing::info!("Disconnected");
        Ok(vec![Notification::Disconnected])
    }

    /// Drop every subscription and the session itself.
    ///
    /// With a client id every tracked channel gets an unsubscribe request,
    /// whatever ended the session. Writes the transport can no longer carry
    /// come back as write errors.
    fn teardown(&self, session: &mut Session) -> Result<()> {
        match session.client_id().map(str::to_owned) {
            Some(client_id) => {
                let released = self.unsubscribe_all(&client_id)?;
                if released > 0 {
                    tracing::info!("Released {} subscriptions with session {}", released, client_id);
                }
            }
            None => {
                let dropped = self.registry.drain_all()?;
                if !dropped.is_empty() {
                    tracing::debug!("Dropped {} subscriptions with the session", dropped.len());
                }
            }
        }
        session.reset();
        Ok(())
    }

    /// Clear the registry, sending one unsubscribe per tracked channel.
    fn unsubscribe_all(&self, client_id: &str) -> Result<usize> {
        let subscriptions = self.registry.drain_all()?;
        for subscription in &subscriptions {
            self.send_or_log(&Envelope::unsubscribe(client_id, subscription.channel()));
        }
        Ok(subscriptions.len())
    }
}
