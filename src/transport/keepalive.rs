//! Keepalive timer.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, trace};

use super::connection::Shared;

/// Enqueues an empty ping every `period` until shutdown.
pub(crate) async fn run(shared: Arc<Shared>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if shared.outbound.ping(Bytes::new()).await.is_err() {
                    break;
                }
                trace!(url = %shared.url, "Keepalive ping queued");
            }
        }
    }

    debug!(url = %shared.url, "Keepalive terminated");
}
