//! Raw connection with explicit subscription.
//!
//! Demonstrates:
//! - Building a `ConnectionConfig` by hand (headers, dump, reconnect policy)
//! - Subscribing through the combined stream endpoint
//! - Sending a ping and a close frame
//!
//! Usage:
//!   cargo run --example 002_raw_connection
//!   cargo run --example 002_raw_connection -- bnbbtc --dump --no-wait

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use depth_stream::market::DEFAULT_BASE_URL;
use depth_stream::{CloseCode, CloseFrame, Connection, ConnectionConfig, ReconnectPolicy};
use serde::Serialize;

// ============================================================================
// Types
// ============================================================================

#[derive(Serialize)]
struct SubscribeRequest {
    method: &'static str,
    params: Vec<String>,
    id: u64,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    println!("=== 002: Raw Connection ===\n");

    // ========================================================================
    // Configure
    // ========================================================================

    let mut config = ConnectionConfig::new(DEFAULT_BASE_URL)
        .with_header("User-Agent", concat!("depth-stream/", env!("CARGO_PKG_VERSION")))
        .with_auto_reconnect()
        .with_reconnect_policy(ReconnectPolicy::new(Duration::from_millis(500), 6))
        .with_message_handler(|frame| {
            let text = String::from_utf8_lossy(frame);
            let preview: String = text.chars().take(96).collect();
            println!("    <- {preview}");
            Ok(())
        })
        .with_error_handler(|e| eprintln!("    ✗ {e}"));
    if args.dump {
        config = config.with_dump();
    }
    config.validate()?;

    println!("[1] Connecting to {DEFAULT_BASE_URL}...");
    let conn = Connection::connect(config).await?;
    println!("    ✓ Connected\n");

    // ========================================================================
    // Subscribe
    // ========================================================================

    let stream = format!("{}@depth@100ms", args.symbol.to_lowercase());
    println!("[2] Subscribing to {stream}...");
    conn.subscribe(&SubscribeRequest {
        method: "SUBSCRIBE",
        params: vec![stream],
        id: 1,
    })
    .await?;
    conn.send_ping(&b"hello"[..]).await?;
    println!("    ✓ {} subscription(s) recorded\n", conn.subscriptions().await.len());

    common::wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Cleanup
    // ========================================================================

    println!("\n[Cleanup] Sending close frame...");
    conn.send_close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "bye".to_string().into(),
    }))
    .await
    .ok();
    conn.shutdown().await;
    println!("          ✓ Done ({:?})", conn.state());

    Ok(())
}
