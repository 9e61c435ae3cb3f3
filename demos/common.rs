//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization
//! - Graceful exit handling

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Symbol streamed when none is given on the command line.
pub const DEFAULT_SYMBOL: &str = "btcusdt";

/// How long a `--no-wait` run streams before shutting down.
pub const NO_WAIT_RUN: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub no_wait: bool,
    pub dump: bool,
    pub symbol: String,
}

impl Args {
    /// Parse command-line arguments.
    ///
    /// The first argument that is not a flag is taken as the symbol.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
            dump: args.iter().any(|a| a == "--dump"),
            symbol: args
                .iter()
                .find(|a| !a.starts_with("--"))
                .cloned()
                .unwrap_or_else(|| DEFAULT_SYMBOL.to_string()),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
///
/// `RUST_LOG` wins over the `--debug` flag when set.
pub fn init_logging(debug: bool) {
    let fallback = if debug {
        "depth_stream=debug"
    } else {
        "depth_stream=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Wait for Ctrl+C, or stream for a few seconds if `--no-wait` is set.
pub async fn wait_for_exit(no_wait: bool) {
    if no_wait {
        println!("[--no-wait] Streaming for {}s", NO_WAIT_RUN.as_secs());
        tokio::time::sleep(NO_WAIT_RUN).await;
        return;
    }

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();
}
