//! Pooled depth stream for one symbol.
//!
//! Demonstrates:
//! - Opening an auto-reconnecting depth stream with `DepthFeed`
//! - Receiving pooled `DepthUpdate` handles and releasing them
//! - Reading pool counters after shutdown
//!
//! Usage:
//!   cargo run --example 001_depth_stream
//!   cargo run --example 001_depth_stream -- ethbtc --no-wait
//!   cargo run --example 001_depth_stream -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::Args;
use depth_stream::market::DepthFeed;
use depth_stream::ConnectionConfig;

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
    println!("=== 001: Depth Stream ===\n");

    // ========================================================================
    // Open Stream
    // ========================================================================

    let mut template = ConnectionConfig::default().with_error_handler(|e| {
        eprintln!("    ✗ Stream failed: {e}");
    });
    if args.dump {
        template = template.with_dump();
    }

    let feed = DepthFeed::new().with_connection_config(template);
    println!("[1] Opening {}...", feed.depth_endpoint(&args.symbol)?);

    let updates = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&updates);

    let conn = feed
        .subscribe_depth(&args.symbol, move |depth| {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            {
                let update = depth.read();
                if n % 10 == 1 {
                    let bid = update.best_bid().map_or("-", |l| l.price.as_str());
                    let ask = update.best_ask().map_or("-", |l| l.price.as_str());
                    println!(
                        "    #{n:<5} u={} bids={} asks={} best={bid}/{ask}",
                        update.last_update_id,
                        update.bids.len(),
                        update.asks.len(),
                    );
                }
            }
            if let Err(e) = depth.release() {
                eprintln!("    ✗ {e}");
            }
        })
        .await?;

    println!("    ✓ Connected ({:?})\n", conn.state());

    common::wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Cleanup
    // ========================================================================

    println!("\n[Cleanup] Shutting down...");
    conn.shutdown().await;
    println!("          ✓ Done");

    println!("\n[Stats] updates={}", updates.load(Ordering::Relaxed));
    println!("        pool: {}", feed.stats());
    println!("        reconnects: {}", conn.reconnect_count());

    Ok(())
}
