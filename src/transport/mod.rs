//! WebSocket transport layer.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────── Connection ────────────────────────┐
//!  subscribe ───► │ registry ─┐                                                │
//!  send_*    ───► │           ├─► data / ping / close queues ─► Writer ─► sink │ ──► server
//!                 │ Keepalive ┘                                   ▲            │
//!                 │                                   new sink    │            │
//!  handler   ◄─── │ Reader ◄─ source ◄──────────────────── Reconnect           │ ◄── server
//!                 └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | Connection options and reconnect policy |
//! | `connection` | Caller-facing handle and shared state |
//! | `dial` | Opening handshake and response dump |
//! | `reader` | Read loop and reconnect controller |
//! | `writer` | Outbound queues and write multiplexer |
//! | `keepalive` | Periodic ping |
//! | `shutdown` | Tri-state cancellation signal |
//! | `subscription` | Replay registry |

// ============================================================================
// Submodules
// ============================================================================

/// Connection options.
pub mod config;

/// Caller-facing connection handle.
pub mod connection;

/// Tri-state cancellation signal.
pub mod shutdown;

/// Subscription registry.
pub mod subscription;

mod dial;
mod keepalive;
mod reader;
mod writer;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{
    ConnectionConfig, ErrorHandler, MessageHandler, QueueCapacity, ReconnectPolicy,
};
pub use connection::{Connection, ConnectionState};
pub use shutdown::{ShutdownSignal, ShutdownState};
pub use subscription::{Subscription, SubscriptionRegistry};
pub use tokio_tungstenite::tungstenite::protocol::CloseFrame;
pub use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
