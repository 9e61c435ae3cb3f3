//! Connection configuration.
//!
//! [`ConnectionConfig`] is a plain value enumerating every recognised
//! connection option. It is passed once to
//! [`Connection::connect`](super::Connection::connect).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use depth_stream::{ConnectionConfig, ReconnectPolicy};
//!
//! let config = ConnectionConfig::new("wss://stream.example.com/ws/btcusdt@depth@100ms")
//!     .with_header("User-Agent", "depth-stream")
//!     .with_auto_reconnect()
//!     .with_read_deadline(Duration::from_secs(30))
//!     .with_reconnect_policy(ReconnectPolicy::new(Duration::from_millis(500), 5));
//!
//! assert!(config.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default liveness deadline (no frame for this long means the link is dead).
pub const DEFAULT_READ_DEADLINE: Duration = Duration::from_secs(60);

/// Default keepalive ping period.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default opening handshake timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);

/// Default pause after a failed write.
pub const DEFAULT_WRITE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default first reconnect delay.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Default number of reconnect attempts.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 10;

// ============================================================================
// Handler Types
// ============================================================================

/// Per-frame callback, invoked synchronously on the read loop.
///
/// Returning an error drops the frame; the stream continues.
pub type MessageHandler = Arc<dyn Fn(&[u8]) -> Result<()> + Send + Sync>;

/// Callback for unrecoverable connection failures.
///
/// Invoked at most once per connection.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Exponential backoff schedule for the reconnect controller.
///
/// Attempt `n` (1-based) waits `initial_delay * 2^(n-1)` before dialing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Creates a policy.
    #[inline]
    #[must_use]
    pub const fn new(initial_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_attempts,
        }
    }

    /// Delay to wait before the given 1-based attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.initial_delay.saturating_mul(1u32 << shift)
    }

    /// Sum of every delay in the schedule.
    #[must_use]
    pub fn total_delay(&self) -> Duration {
        (1..=self.max_attempts)
            .map(|attempt| self.delay_for(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

// ============================================================================
// QueueCapacity
// ============================================================================

/// Bounds of the three outbound queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCapacity {
    /// Data (text/binary) frames.
    pub data: usize,
    /// Ping frames.
    pub ping: usize,
    /// Close frames.
    pub close: usize,
}

impl Default for QueueCapacity {
    fn default() -> Self {
        Self {
            data: 10,
            ping: 10,
            close: 1,
        }
    }
}

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Options for a [`Connection`](super::Connection).
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Endpoint URL (`wss://` or `ws://`).
    pub url: String,

    /// Handshake request headers; a name may repeat.
    pub headers: Vec<(String, String)>,

    /// Per-frame callback.
    pub message_handler: Option<MessageHandler>,

    /// Terminal failure callback.
    pub error_handler: Option<ErrorHandler>,

    /// Re-dial and replay subscriptions after a transport failure.
    pub auto_reconnect: bool,

    /// Log handshake responses for diagnostics.
    pub dump: bool,

    /// Maximum silence before the link is considered dead.
    pub read_deadline: Duration,

    /// Keepalive ping period (`None` disables keepalive).
    pub keepalive_interval: Option<Duration>,

    /// Opening handshake timeout.
    pub handshake_timeout: Duration,

    /// Pause after a failed write before the writer continues.
    pub write_retry_delay: Duration,

    /// Backoff schedule for reconnects.
    pub reconnect: ReconnectPolicy,

    /// Outbound queue bounds.
    pub queues: QueueCapacity,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: Vec::new(),
            message_handler: None,
            error_handler: None,
            auto_reconnect: false,
            dump: false,
            read_deadline: DEFAULT_READ_DEADLINE,
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            write_retry_delay: DEFAULT_WRITE_RETRY_DELAY,
            reconnect: ReconnectPolicy::default(),
            queues: QueueCapacity::default(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("message_handler", &self.message_handler.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .field("auto_reconnect", &self.auto_reconnect)
            .field("dump", &self.dump)
            .field("read_deadline", &self.read_deadline)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("write_retry_delay", &self.write_retry_delay)
            .field("reconnect", &self.reconnect)
            .field("queues", &self.queues)
            .finish()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionConfig {
    /// Creates a configuration for `url` with default options.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionConfig {
    /// Appends a handshake header (repeated names are kept).
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the per-frame handler.
    #[must_use]
    pub fn with_message_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[u8]) -> Result<()> + Send + Sync + 'static,
    {
        self.message_handler = Some(Arc::new(handler));
        self
    }

    /// Sets the terminal failure handler.
    #[must_use]
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Enables reconnect with subscription replay.
    #[inline]
    #[must_use]
    pub fn with_auto_reconnect(mut self) -> Self {
        self.auto_reconnect = true;
        self
    }

    /// Enables handshake response dumps.
    #[inline]
    #[must_use]
    pub fn with_dump(mut self) -> Self {
        self.dump = true;
        self
    }

    /// Sets the liveness deadline.
    #[inline]
    #[must_use]
    pub fn with_read_deadline(mut self, deadline: Duration) -> Self {
        self.read_deadline = deadline;
        self
    }

    /// Sets the keepalive period.
    #[inline]
    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = Some(interval);
        self
    }

    /// Disables keepalive pings.
    #[inline]
    #[must_use]
    pub fn without_keepalive(mut self) -> Self {
        self.keepalive_interval = None;
        self
    }

    /// Sets the opening handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the pause after a failed write.
    #[inline]
    #[must_use]
    pub fn with_write_retry_delay(mut self, delay: Duration) -> Self {
        self.write_retry_delay = delay;
        self
    }

    /// Sets the reconnect backoff schedule.
    #[inline]
    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Sets the outbound queue bounds.
    #[inline]
    #[must_use]
    pub fn with_queue_capacity(mut self, queues: QueueCapacity) -> Self {
        self.queues = queues;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the URL is empty, unparsable or not a
    /// WebSocket scheme, when a duration or queue bound is zero, or when a
    /// header name or value is not valid HTTP.
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(Error::config("url cannot be empty"));
        }

        let parsed =
            Url::parse(&self.url).map_err(|e| Error::config(format!("invalid url: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::config("url must start with ws:// or wss://"));
        }

        if self.read_deadline.is_zero() {
            return Err(Error::config("read deadline must be greater than zero"));
        }

        if self.keepalive_interval.is_some_and(|d| d.is_zero()) {
            return Err(Error::config("keepalive interval must be greater than zero"));
        }

        if self.handshake_timeout.is_zero() {
            return Err(Error::config("handshake timeout must be greater than zero"));
        }

        let QueueCapacity { data, ping, close } = self.queues;
        if data == 0 || ping == 0 || close == 0 {
            return Err(Error::config("queue capacities must be greater than zero"));
        }

        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::config(format!("invalid header name: {name:?}")))?;
            HeaderValue::from_str(value)
                .map_err(|_| Error::config(format!("invalid value for header {name}")))?;
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
