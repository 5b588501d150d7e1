//! Periodic re-submission of unacknowledged subscriptions.
//!
//! A subscribe request can be lost between client and server without either
//! side noticing. The [`RetryScheduler`] runs a background task that, at a
//! fixed interval and only while the session is live, sends a fresh subscribe
//! request for every subscription still awaiting acknowledgment.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use crate::client::Inner;
use crate::error::{ClientError, Result};

/// Handle to the background retry task.
///
/// # Shutdown
///
/// [`shutdown`](Self::shutdown) signals the task and waits a bounded time for
/// it to finish; [`abort`](Self::abort) stops it immediately.
pub(crate) struct RetryScheduler {
    background_task: Option<JoinHandle<()>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl RetryScheduler {
    /// Spawn the retry task on `runtime`, first firing one `period` from now.
    pub(crate) fn start(runtime: &Handle, inner: Weak<Inner>, period: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let background_task = runtime.spawn(Self::retry_task(inner, period, shutdown_rx));

        Self {
            background_task: Some(background_task),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Signal the task to stop and wait up to `wait` for it.
    pub(crate) async fn shutdown(mut self, wait: Duration) -> Result<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(()).await;
        }

        let Some(task) = self.background_task.take() else {
            return Ok(());
        };

        match timeout(wait, task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ClientError::Shutdown(format!("Retry task panicked: {e}"))),
            Err(_) => Err(ClientError::Shutdown(format!(
                "Retry task shutdown timed out after {wait:?}"
            ))),
        }
    }

    /// Stop the task without waiting.
    pub(crate) fn abort(mut self) {
        if let Some(task) = self.background_task.take() {
            task.abort();
        }
    }

    async fn retry_task(inner: Weak<Inner>, period: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    match inner.resubscribe_pending() {
                        Ok(0) => {}
                        Ok(count) => tracing::debug!("Re-sent {} pending subscriptions", count),
                        Err(e) => tracing::warn!("Pending subscription retry failed: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
        tracing::debug!("Retry scheduler stopped");
    }
}

impl Inner {
    /// Re-send every pending subscription. A no-op unless the session is live.
    ///
    /// Runs under the session lock so it cannot interleave with a disconnect
    /// clearing the registry.
    pub(crate) fn resubscribe_pending(&self) -> Result<usize> {
        let session = self.lock_session()?;
        let Some(client_id) = session.live_client_id() else {
            return Ok(0);
        };

        let pending = self.registry.pending()?;
        let count = pending.len();
        for subscription in pending {
            self.request_subscription(subscription, client_id);
        }
        Ok(count)
    }
}
