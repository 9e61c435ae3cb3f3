//! Self-healing WebSocket connection.
//!
//! A [`Connection`] dials its endpoint, then runs up to three background
//! tasks until shutdown:
//!
//! - **writer**: sole owner of the write half; multiplexes data, ping and
//!   close queues
//! - **reader**: sole owner of the read half; enforces the liveness
//!   deadline, dispatches frames, drives reconnects
//! - **keepalive** (optional): queues a ping every period
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ──► Open ──► Reconnecting ──► Open
//!                  │           │
//!                  └───────────┴──────────► Closed
//! ```
//!
//! `Closed` is terminal. [`Connection::close`] and [`Connection::shutdown`]
//! may be called any number of times from any task.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

use super::config::{ConnectionConfig, ErrorHandler, MessageHandler};
use super::dial::dial;
use super::keepalive;
use super::reader::Reader;
use super::shutdown::{ShutdownSignal, ShutdownState};
use super::subscription::{Subscription, SubscriptionRegistry};
use super::writer::{self, Outbound, Writer};

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Initial dial in progress.
    Connecting = 0,
    /// Reader and writer running.
    Open = 1,
    /// Transport failed; the reconnect controller is re-dialing.
    Reconnecting = 2,
    /// Terminal.
    Closed = 3,
}

impl ConnectionState {
    #[inline]
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Reconnecting,
            _ => Self::Closed,
        }
    }
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between the caller-facing handle and the background tasks.
pub(crate) struct Shared {
    pub(crate) url: String,
    /// Handlers are moved out into the mutexes below.
    pub(crate) config: ConnectionConfig,
    message_handler: Mutex<Option<MessageHandler>>,
    error_handler: Mutex<Option<ErrorHandler>>,
    pub(crate) outbound: Outbound,
    pub(crate) shutdown: ShutdownSignal,
    /// Async lock: subscribe and reconnect both hold it across an enqueue.
    subscriptions: AsyncMutex<SubscriptionRegistry>,
    state: AtomicU8,
    reconnects: AtomicU32,
    terminal_reported: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    #[inline]
    pub(crate) fn message_handler(&self) -> Option<MessageHandler> {
        self.message_handler.lock().clone()
    }

    #[inline]
    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves to `next` unless already closed.
    pub(crate) fn set_state(&self, next: ConnectionState) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ConnectionState::Closed as u8).then_some(next as u8)
            });
    }

    /// Records a successful reconnect.
    pub(crate) fn mark_reconnected(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        self.set_state(ConnectionState::Open);
    }

    /// Marks the connection closed and signals every task.
    ///
    /// Returns `true` for the call that requested shutdown.
    pub(crate) fn close(&self) -> bool {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
        let first = self.shutdown.request();
        if first {
            debug!(url = %self.url, "Shutdown requested");
        }
        first
    }

    /// Closes the connection and surfaces `err` exactly once.
    pub(crate) fn report_terminal(&self, err: Error) {
        self.close();
        if self.terminal_reported.swap(true, Ordering::AcqRel) {
            return;
        }

        let handler = self.error_handler.lock().clone();
        match handler {
            Some(handler) => handler(&err),
            None => error!(url = %self.url, error = %err, "Connection failed"),
        }
    }

    /// Locks the subscription registry.
    pub(crate) async fn lock_subscriptions(&self) -> AsyncMutexGuard<'_, SubscriptionRegistry> {
        self.subscriptions.lock().await
    }

    /// Re-issues every recorded subscription in order.
    ///
    /// Snapshots the full registry before clearing it, then re-enqueues and
    /// re-records each entry. Entries not yet re-issued when an enqueue
    /// fails are kept.
    pub(crate) async fn replay(&self, registry: &mut SubscriptionRegistry) -> Result<()> {
        let snapshot = registry.take();
        let total = snapshot.len();

        let mut pending = snapshot.into_iter();
        while let Some(entry) = pending.next() {
            if let Err(e) = self
                .outbound
                .data(Message::text(entry.wire().to_owned()))
                .await
            {
                registry.push(entry);
                pending.for_each(|rest| registry.push(rest));
                return Err(e);
            }
            registry.push(entry);
        }

        debug!(url = %self.url, count = total, "Subscriptions replayed");
        Ok(())
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Last handle standing closes the connection on drop.
struct Owner {
    shared: Arc<Shared>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Persistent duplex WebSocket connection with keepalive and
/// reconnect-with-replay.
///
/// Cloning yields another handle to the same connection. Dropping the last
/// handle requests shutdown; call [`shutdown`](Self::shutdown) to also wait
/// for the background tasks.
///
/// # Example
///
/// ```ignore
/// use depth_stream::{Connection, ConnectionConfig};
///
/// let config = ConnectionConfig::new("wss://stream.binance.com:9443/ws")
///     .with_auto_reconnect()
///     .with_message_handler(|frame| {
///         println!("{}", String::from_utf8_lossy(frame));
///         Ok(())
///     });
///
/// let conn = Connection::connect(config).await?;
/// conn.subscribe(&serde_json::json!({
///     "method": "SUBSCRIBE",
///     "params": ["btcusdt@depth@100ms"],
///     "id": 1
/// }))
/// .await?;
/// ```
#[derive(Clone)]
pub struct Connection {
    owner: Arc<Owner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.shared().url)
            .field("state", &self.state())
            .field("reconnects", &self.reconnect_count())
            .finish()
    }
}

// ============================================================================
// Connection - Construction
// ============================================================================

impl Connection {
    /// Validates `config`, dials, and starts the background tasks.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::Dial`] if the opening handshake fails; no task is left
    ///   running
    pub async fn connect(mut config: ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let stream = dial(&config).await?;
        let (sink, source) = stream.split();

        let url = config.url.clone();
        let shutdown = ShutdownSignal::new();
        let (outbound, inbox) = writer::queues(config.queues, shutdown.clone());
        let (sinks_tx, sinks_rx) = mpsc::channel(1);

        let message_handler = config.message_handler.take();
        let error_handler = config.error_handler.take();
        let keepalive_interval = config.keepalive_interval;
        let retry_delay = config.write_retry_delay;

        let shared = Arc::new(Shared {
            url: url.clone(),
            config,
            message_handler: Mutex::new(message_handler),
            error_handler: Mutex::new(error_handler),
            outbound,
            shutdown: shutdown.clone(),
            subscriptions: AsyncMutex::new(SubscriptionRegistry::new()),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            reconnects: AtomicU32::new(0),
            terminal_reported: AtomicBool::new(false),
            tasks: Mutex::new(Vec::with_capacity(3)),
        });

        // Open before the reader starts; it may move on at once.
        shared.set_state(ConnectionState::Open);

        let writer = Writer::new(sink, inbox, sinks_rx, shutdown, retry_delay, url.clone());
        let reader = Reader::new(Arc::clone(&shared), source, sinks_tx);

        let mut tasks = vec![tokio::spawn(writer.run()), tokio::spawn(reader.run())];
        if let Some(period) = keepalive_interval {
            tasks.push(tokio::spawn(keepalive::run(Arc::clone(&shared), period)));
        }
        *shared.tasks.lock() = tasks;

        info!(url = %url, "Connected");

        Ok(Self {
            owner: Arc::new(Owner { shared }),
        })
    }

    #[inline]
    fn shared(&self) -> &Shared {
        &self.owner.shared
    }
}

// ============================================================================
// Connection - Outbound
// ============================================================================

impl Connection {
    /// Records `payload`, serializes it, and queues it for transmission.
    ///
    /// Recorded subscriptions are replayed verbatim, in order, after every
    /// successful reconnect. A subscription is recorded only once it has
    /// been queued.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if serialization fails
    /// - [`Error::ConnectionClosed`] after shutdown
    pub async fn subscribe<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let entry = Subscription::new(payload)?;

        let mut registry = self.shared().subscriptions.lock().await;
        self.shared()
            .outbound
            .data(Message::text(entry.wire().to_owned()))
            .await?;
        registry.push(entry);
        Ok(())
    }

    /// Queues a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `payload` is not UTF-8
    /// - [`Error::ConnectionClosed`] after shutdown
    pub async fn send_raw(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        let text = String::from_utf8(payload.into())
            .map_err(|e| Error::invalid_argument(format!("text frame is not UTF-8: {e}")))?;
        self.shared().outbound.data(Message::text(text)).await
    }

    /// Queues a binary frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] after shutdown.
    pub async fn send_binary(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.shared()
            .outbound
            .data(Message::Binary(payload.into()))
            .await
    }

    /// Queues a ping frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] after shutdown.
    pub async fn send_ping(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.shared().outbound.ping(payload.into()).await
    }

    /// Queues a close frame.
    ///
    /// The peer's close reply ends the read loop and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] after shutdown.
    pub async fn send_close(&self, frame: Option<CloseFrame>) -> Result<()> {
        self.shared().outbound.close(frame).await
    }

    /// Serializes `value` and queues it as a text frame.
    ///
    /// Unlike [`subscribe`](Self::subscribe) the payload is not replayed.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if serialization fails
    /// - [`Error::ConnectionClosed`] after shutdown
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.shared().outbound.data(Message::text(text)).await
    }
}

// ============================================================================
// Connection - Handlers
// ============================================================================

impl Connection {
    /// Sets the per-frame handler.
    ///
    /// Takes effect from the next frame.
    pub fn set_message_handler<F>(&self, handler: F)
    where
        F: Fn(&[u8]) -> Result<()> + Send + Sync + 'static,
    {
        *self.shared().message_handler.lock() = Some(Arc::new(handler));
    }

    /// Removes the per-frame handler; frames are dropped until a new one is set.
    pub fn clear_message_handler(&self) {
        *self.shared().message_handler.lock() = None;
    }

    /// Sets the terminal failure handler.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        *self.shared().error_handler.lock() = Some(Arc::new(handler));
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Requests shutdown without waiting.
    ///
    /// Returns `true` for the call that made the request.
    pub fn close(&self) -> bool {
        self.shared().close()
    }

    /// Requests shutdown and waits until every background task has exited.
    ///
    /// Idempotent: concurrent and repeated calls all return once the tasks
    /// are gone. The tasks are joined on a detached task, so dropping this
    /// future early does not stop the join or stall later calls.
    pub async fn shutdown(&self) {
        let shared = self.shared();
        shared.close();

        let handles = std::mem::take(&mut *shared.tasks.lock());
        if !handles.is_empty() {
            let signal = shared.shutdown.clone();
            let url = shared.url.clone();
            tokio::spawn(async move {
                for handle in handles {
                    if let Err(e) = handle.await {
                        warn!(url = %url, error = %e, "Background task ended abnormally");
                    }
                }
                signal.acknowledge();
                info!(url = %url, "Connection shut down");
            });
        }

        shared.shutdown.acknowledged().await;
    }

    /// Resolves once shutdown has been requested (by anyone).
    pub async fn closed(&self) {
        self.shared().shutdown.cancelled().await;
    }
}

// ============================================================================
// Connection - Introspection
// ============================================================================

impl Connection {
    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared().state()
    }

    /// Returns `true` once the connection is closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Progress of the shutdown sequence.
    #[inline]
    #[must_use]
    pub fn shutdown_state(&self) -> ShutdownState {
        self.shared().shutdown.state()
    }

    /// Endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared().url
    }

    /// Number of successful reconnects so far.
    #[inline]
    #[must_use]
    pub fn reconnect_count(&self) -> u32 {
        self.shared().reconnects.load(Ordering::Relaxed)
    }

    /// Recorded subscriptions in insertion order.
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.shared().subscriptions.lock().await.snapshot()
    }
}

// ============================================================================
// Tests
// ============================================================================
