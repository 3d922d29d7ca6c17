use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch::Receiver;
use tracing::{debug, info};

use crate::broker::MemoryLog;

/// Applies `log`'s retention every `interval` until shutdown fires or its
/// sender is dropped.
pub async fn run_periodic_cleanup(log: Arc<MemoryLog>, mut shutdown_rx: Receiver<()>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // the first tick completes at once
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = log.cleanup().await;
                debug!(?report, "retention pass completed");
            }

            _ = shutdown_rx.changed() => {
                info!("retention task stopped");
                break;
            }
        }
    }
}
