//! depth-stream - self-healing WebSocket client for order-book depth feeds.
//!
//! The crate pairs a persistent duplex WebSocket connection with a
//! reference-counted object pool for the decode/dispatch path.
//!
//! # Architecture
//!
//! - [`Connection`] dials once, then runs a single writer task, a single
//!   reader task and an optional keepalive task
//! - the reader enforces a liveness deadline refreshed by every frame,
//!   including pings and pongs
//! - on a transport failure the reader re-dials with exponential backoff
//!   and replays every recorded subscription in order
//! - [`Pool`] hands out [`Pooled`] handles whose last release resets the
//!   instance and puts it back on the free list
//!
//! # Quick Start
//!
//! ```no_run
//! use depth_stream::market::DepthFeed;
//! use depth_stream::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let feed = DepthFeed::new();
//!
//!     let conn = feed
//!         .subscribe_depth("BTCUSDT", |depth| {
//!             if let Some(bid) = depth.read().best_bid() {
//!                 println!("best bid {} x {}", bid.price, bid.quantity);
//!             }
//!             let _ = depth.release();
//!         })
//!         .await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     conn.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`transport`] | Connection, configuration, reconnect and replay |
//! | [`pool`] | Reference-counted object pool |
//! | [`market`] | Depth update model and per-symbol feed |
//! | [`error`] | Error types and [`Result`] alias |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Depth update model and per-symbol feed.
pub mod market;

/// Reference-counted object pool.
pub mod pool;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Pool types
pub use pool::{Pool, PoolMisuse, PoolStats, Pooled};

// Transport types
pub use transport::{
    CloseCode, CloseFrame, Connection, ConnectionConfig, ConnectionState, QueueCapacity,
    ReconnectPolicy,
};

// Market types
pub use market::{DepthFeed, DepthUpdate, PriceLevel};
