//! Market-data layer on top of the transport.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `depth` | Depth update model and decoder |
//! | `feed` | Per-symbol depth streams backed by a pool |

/// Depth update model.
pub mod depth;

/// Per-symbol depth streams.
pub mod feed;

pub use depth::{DepthUpdate, PriceLevel};
pub use feed::{DEFAULT_BASE_URL, DEFAULT_INTERVAL, DepthFeed};
