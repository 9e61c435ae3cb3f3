//! Per-symbol depth stream with pooled decoding.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pool::{Pool, PoolStats, Pooled};
use crate::transport::{Connection, ConnectionConfig};

use super::depth::DepthUpdate;

// ============================================================================
// Constants
// ============================================================================

/// Public market-data stream endpoint.
pub const DEFAULT_BASE_URL: &str = "wss://stream.binance.com:9443/ws";

/// Update interval appended to the stream name.
pub const DEFAULT_INTERVAL: &str = "100ms";

// ============================================================================
// DepthFeed
// ============================================================================

/// Opens depth streams and decodes every frame into a pooled
/// [`DepthUpdate`].
///
/// All streams opened from one feed share its pool.
///
/// # Example
///
/// ```ignore
/// use depth_stream::market::DepthFeed;
///
/// let feed = DepthFeed::new();
/// let conn = feed
///     .subscribe_depth("BTCUSDT", |depth| {
///         println!("{}", depth.read().last_update_id);
///         let _ = depth.release();
///     })
///     .await?;
/// ```
#[derive(Clone)]
pub struct DepthFeed {
    base_url: String,
    interval: String,
    template: ConnectionConfig,
    pool: Pool<DepthUpdate>,
}

impl Default for DepthFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DepthFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepthFeed")
            .field("base_url", &self.base_url)
            .field("interval", &self.interval)
            .field("pool", &self.pool.stats())
            .finish()
    }
}

impl DepthFeed {
    /// Creates a feed for [`DEFAULT_BASE_URL`] at [`DEFAULT_INTERVAL`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            interval: DEFAULT_INTERVAL.to_string(),
            template: ConnectionConfig::default(),
            pool: Pool::new(DepthUpdate::default, DepthUpdate::reset),
        }
    }

    /// Overrides the stream base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the update interval (e.g. `"1000ms"`).
    #[must_use]
    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = interval.into();
        self
    }

    /// Connection options applied to every stream.
    ///
    /// The URL and message handler are always replaced, and auto-reconnect
    /// is always on.
    #[must_use]
    pub fn with_connection_config(mut self, template: ConnectionConfig) -> Self {
        self.template = template;
        self
    }

    /// Pool backing decoded updates.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &Pool<DepthUpdate> {
        &self.pool
    }

    /// Pool counters.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Stream URL for `symbol`: `<base>/<symbol>@depth@<interval>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `symbol` is empty or contains
    /// characters that cannot appear in a stream name.
    pub fn depth_endpoint(&self, symbol: &str) -> Result<String> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(Error::invalid_argument("symbol cannot be empty"));
        }
        if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::invalid_argument(format!(
                "symbol must be alphanumeric: {symbol:?}"
            )));
        }

        Ok(format!(
            "{}/{}@depth@{}",
            self.base_url.trim_end_matches('/'),
            symbol.to_ascii_lowercase(),
            self.interval
        ))
    }

    /// Builds the connection options for one symbol.
    ///
    /// The handler acquires a pooled update per frame, decodes into it, and
    /// passes the handle to `callback`, which owns the release. A frame that
    /// fails to decode is released and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a bad symbol.
    pub fn config_for<F>(&self, symbol: &str, callback: F) -> Result<ConnectionConfig>
    where
        F: Fn(Pooled<DepthUpdate>) + Send + Sync + 'static,
    {
        let mut config = self.template.clone();
        config.url = self.depth_endpoint(symbol)?;
        config.auto_reconnect = true;

        let pool = self.pool.clone();
        Ok(config.with_message_handler(move |frame| {
            let depth = pool.acquire();
            let decoded = depth.write().decode_into(frame);
            if let Err(e) = decoded {
                warn!(
                    error = %e,
                    frame = %String::from_utf8_lossy(frame),
                    "Depth frame rejected"
                );
                depth.release()?;
                return Err(e);
            }
            callback(depth);
            Ok(())
        }))
    }

    /// Opens an auto-reconnecting depth stream for `symbol`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for a bad symbol
    /// - [`Error::Dial`] if the stream cannot be opened
    pub async fn subscribe_depth<F>(&self, symbol: &str, callback: F) -> Result<Connection>
    where
        F: Fn(Pooled<DepthUpdate>) + Send + Sync + 'static,
    {
        let config = self.config_for(symbol, callback)?;
        debug!(url = %config.url, "Opening depth stream");
        Connection::connect(config).await
    }
}

// ============================================================================
// Tests
// ============================================================================
