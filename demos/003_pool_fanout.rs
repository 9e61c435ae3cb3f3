//! Pool fan-out without a network.
//!
//! Demonstrates:
//! - Decoding frames into pooled `DepthUpdate` instances
//! - Sharing one instance across several consumers with `retain`
//! - Instance reuse once the last consumer releases
//! - `PoolMisuse` on a double release
//!
//! Usage:
//!   cargo run --example 003_pool_fanout
//!   cargo run --example 003_pool_fanout -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::Args;
use depth_stream::{DepthUpdate, Pool, PoolMisuse};

// ============================================================================
// Constants
// ============================================================================

const CONSUMERS: usize = 4;

const FRAMES: &[&str] = &[
    r#"{"u":101,"b":[["27000.10","0.5"]],"a":[["27000.20","1.2"]]}"#,
    r#"{"u":102,"b":[["27000.00","2.0"],["26999.90","0.1"]],"a":[]}"#,
    r#"{"u":103,"b":[],"a":[["27000.30","3.3"]]}"#,
    r#"{"u":104,"b":"#,
];

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    println!("=== 003: Pool Fan-out ===\n");

    let pool = Pool::new(DepthUpdate::default, DepthUpdate::reset);

    // ========================================================================
    // Fan-out
    // ========================================================================

    println!("[1] Dispatching {} frames to {CONSUMERS} consumers...", FRAMES.len());

    for frame in FRAMES {
        let depth = pool.acquire();
        let decoded = depth.write().decode_into(frame.as_bytes());
        if let Err(e) = decoded {
            println!("    ✗ dropped: {e}");
            depth.release()?;
            continue;
        }

        let mut consumers = Vec::with_capacity(CONSUMERS);
        for id in 0..CONSUMERS {
            let handle = depth.retain()?;
            consumers.push(tokio::spawn(async move {
                let levels = {
                    let update = handle.read();
                    update.bids.len() + update.asks.len()
                };
                let last = handle.release()?;
                Ok::<_, PoolMisuse>((id, levels, last))
            }));
        }
        let producer_last = depth.release()?;

        let mut returned_by = producer_last.then_some("producer".to_string());
        for consumer in consumers {
            let (id, levels, last) = consumer.await??;
            if last {
                returned_by = Some(format!("consumer {id}"));
            }
            if id == 0 {
                println!("    ✓ slot {} carries {levels} level(s)", depth.slot_id());
            }
        }
        println!(
            "      returned to pool by {}",
            returned_by.as_deref().unwrap_or("nobody")
        );
    }

    println!("\n    pool: {}\n", pool.stats());

    // ========================================================================
    // Misuse
    // ========================================================================

    println!("[2] Releasing twice...");
    let depth = pool.acquire();
    depth.release()?;
    match depth.release() {
        Err(e) => println!("    ✓ rejected: {e}"),
        Ok(_) => println!("    ✗ second release accepted"),
    }

    let stats = pool.stats();
    println!("\n[Stats] {stats}");
    println!("        hit ratio: {:.2}", stats.hit_ratio());

    Ok(())
}
