//! Read loop and reconnect controller.
//!
//! The reader owns the socket's read half. Every read is bounded by the
//! liveness deadline, which any received frame (data, ping or pong)
//! refreshes. Data frames go to the message handler synchronously, so a
//! slow handler throttles the loop.
//!
//! On a transport failure the reader either hands off to the reconnect
//! controller (auto-reconnect) or reports the failure once and stops.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};

use super::connection::{ConnectionState, Shared};
use super::dial::{WsSource, dial};
use super::writer::Handover;

// ============================================================================
// Types
// ============================================================================

/// Why [`Reader::pump`] returned.
enum Exit {
    /// Shutdown was requested.
    Shutdown,
    /// The peer sent a close frame.
    PeerClosed,
    /// The transport failed.
    Failed(Error),
}

/// Outcome of a reconnect run.
enum Recovery {
    /// A new socket is live and subscriptions were replayed.
    Resumed,
    /// Shutdown was requested mid-way.
    Cancelled,
}

// ============================================================================
// Reader
// ============================================================================

/// The read loop task.
pub(crate) struct Reader {
    shared: Arc<Shared>,
    source: WsSource,
    /// Hands fresh write halves to the writer after a reconnect.
    sinks: mpsc::Sender<Handover>,
}

impl Reader {
    pub(crate) fn new(
        shared: Arc<Shared>,
        source: WsSource,
        sinks: mpsc::Sender<Handover>,
    ) -> Self {
        Self {
            shared,
            source,
            sinks,
        }
    }

    /// Runs until shutdown, a peer close, or an unrecoverable failure.
    pub(crate) async fn run(mut self) {
        loop {
            let err = match self.pump().await {
                Exit::Shutdown | Exit::PeerClosed => break,
                Exit::Failed(err) => err,
            };

            if self.shared.shutdown.is_requested() {
                break;
            }

            if !self.shared.config.auto_reconnect {
                self.shared.report_terminal(err);
                break;
            }

            warn!(url = %self.shared.url, error = %err, "Read failed, reconnecting");
            match self.reconnect().await {
                Ok(Recovery::Resumed) => continue,
                Ok(Recovery::Cancelled) => break,
                Err(exhausted) => {
                    self.shared.report_terminal(exhausted);
                    break;
                }
            }
        }

        debug!(url = %self.shared.url, "Reader terminated");
    }

    /// Reads and dispatches frames until something ends the stream.
    async fn pump(&mut self) -> Exit {
        let deadline = self.shared.config.read_deadline;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shared.shutdown.cancelled() => return Exit::Shutdown,
                next = timeout(deadline, self.source.next()) => next,
            };

            let frame = match next {
                Err(_) => {
                    return Exit::Failed(Error::deadline_exceeded(deadline.as_millis() as u64));
                }
                Ok(None) => return Exit::Failed(Error::read("stream ended")),
                Ok(Some(Err(e))) => return Exit::Failed(Error::from(e)),
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                Message::Text(text) => self.dispatch(text.as_bytes()),
                Message::Binary(data) => self.dispatch(&data),
                Message::Ping(payload) => trace!(len = payload.len(), "Ping received"),
                Message::Pong(payload) => trace!(len = payload.len(), "Pong received"),
                Message::Close(frame) => {
                    debug!(url = %self.shared.url, ?frame, "Close frame received");
                    self.shared.close();
                    return Exit::PeerClosed;
                }
                Message::Frame(_) => {}
            }
        }
    }

    /// Runs the message handler on one data frame.
    fn dispatch(&self, payload: &[u8]) {
        let Some(handler) = self.shared.message_handler() else {
            trace!(len = payload.len(), "No message handler, frame dropped");
            return;
        };

        if let Err(e) = handler(payload) {
            warn!(url = %self.shared.url, error = %e, "Handler rejected frame, dropped");
        }
    }

    /// Re-dials with exponential backoff and replays subscriptions.
    ///
    /// The subscription registry stays locked from before the write half is
    /// handed over until replay is queued, so a concurrent `subscribe`
    /// lands either wholly before the switch (and is replayed) or wholly
    /// after it (and is not).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReconnectExhausted`] once every attempt failed.
    async fn reconnect(&mut self) -> Result<Recovery> {
        let policy = self.shared.config.reconnect;
        self.shared.set_state(ConnectionState::Reconnecting);

        for attempt in 1..=policy.max_attempts {
            let delay = policy.delay_for(attempt);
            debug!(
                url = %self.shared.url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnect scheduled"
            );

            let dialed = tokio::select! {
                biased;
                _ = self.shared.shutdown.cancelled() => return Ok(Recovery::Cancelled),
                dialed = async {
                    sleep(delay).await;
                    dial(&self.shared.config).await
                } => dialed,
            };

            let stream = match dialed {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(
                        url = %self.shared.url,
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                    continue;
                }
            };

            let (sink, source) = stream.split();
            let mut registry = tokio::select! {
                biased;
                _ = self.shared.shutdown.cancelled() => return Ok(Recovery::Cancelled),
                registry = self.shared.lock_subscriptions() => registry,
            };

            let epoch = self.shared.outbound.epoch() + 1;
            let handed_over = tokio::select! {
                biased;
                _ = self.shared.shutdown.cancelled() => false,
                sent = self.sinks.send(Handover { epoch, sink }) => sent.is_ok(),
            };
            if !handed_over {
                return Ok(Recovery::Cancelled);
            }
            self.shared.outbound.advance_epoch(epoch);

            self.source = source;
            self.shared.mark_reconnected();
            info!(url = %self.shared.url, attempt, epoch, "Reconnected");

            if let Err(e) = self.shared.replay(&mut registry).await {
                if self.shared.shutdown.is_requested() {
                    return Ok(Recovery::Cancelled);
                }
                warn!(url = %self.shared.url, error = %e, "Subscription replay interrupted");
            }

            return Ok(Recovery::Resumed);
        }

        Err(Error::reconnect_exhausted(policy.max_attempts))
    }
}
