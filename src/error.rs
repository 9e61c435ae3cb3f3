//! Error types for depth-stream.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use depth_stream::{Connection, ConnectionConfig, Result};
//!
//! async fn example() -> Result<()> {
//!     let conn = Connection::connect(ConnectionConfig::new("wss://example.com/ws")).await?;
//!     conn.send_raw("hello").await?;
//!     conn.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Connection | [`Error::Dial`], [`Error::Read`], [`Error::DeadlineExceeded`], [`Error::ConnectionClosed`], [`Error::ReconnectExhausted`] |
//! | Payload | [`Error::Decode`] |
//! | Pool | [`Error::PoolMisuse`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::pool::PoolMisuse;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a [`ConnectionConfig`](crate::ConnectionConfig) fails validation.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to an operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Initial dial failed.
    ///
    /// Returned synchronously from [`Connection::connect`](crate::Connection::connect).
    #[error("Dial failed for {url}: {message}")]
    Dial {
        /// Endpoint that was dialed.
        url: String,
        /// Description of the dial failure.
        message: String,
    },

    /// Transport read failed.
    #[error("Read failed: {message}")]
    Read {
        /// Description of the read failure.
        message: String,
    },

    /// No frame arrived within the liveness deadline.
    #[error("No frame received within {timeout_ms}ms")]
    DeadlineExceeded {
        /// Liveness deadline in milliseconds.
        timeout_ms: u64,
    },

    /// Connection is closed.
    ///
    /// Returned by send operations after shutdown.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Every reconnect attempt failed.
    #[error("Reconnect failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    // ========================================================================
    // Payload Errors
    // ========================================================================
    /// Inbound payload could not be decoded.
    ///
    /// The offending frame is dropped; the stream continues.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    // ========================================================================
    // Pool Errors
    // ========================================================================
    /// Pooled handle lifetime violation.
    #[error(transparent)]
    PoolMisuse(#[from] PoolMisuse),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket protocol or transport error.
    ///
    /// Carries read failures reported by the socket itself.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a dial error.
    #[inline]
    pub fn dial(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dial {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a read error.
    #[inline]
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    /// Creates a deadline exceeded error.
    #[inline]
    pub fn deadline_exceeded(timeout_ms: u64) -> Self {
        Self::DeadlineExceeded { timeout_ms }
    }

    /// Creates a reconnect exhausted error.
    #[inline]
    pub fn reconnect_exhausted(attempts: u32) -> Self {
        Self::ReconnectExhausted { attempts }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Dial { .. }
                | Self::Read { .. }
                | Self::DeadlineExceeded { .. }
                | Self::ConnectionClosed
                | Self::ReconnectExhausted { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable by reconnecting.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Read { .. } | Self::DeadlineExceeded { .. } | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a payload decode error.
    #[inline]
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Json(_))
    }
}

// ============================================================================
// Tests
// ============================================================================
