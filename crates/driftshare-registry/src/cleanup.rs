use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::ShareRegistry;

/// Longest allowed pause between sweeps.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Sweep interval for a configured number of seconds, clamped to 1..=300.
pub fn sweep_interval(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(1, MAX_SWEEP_INTERVAL.as_secs()))
}

/// Background task that prunes expired shares.
///
/// Runs on an interval until `shutdown` is cancelled. Reads already hide
/// expired entries; this only reclaims their storage.
pub async fn run_sweep_loop(registry: ShareRegistry, interval: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(interval.min(MAX_SWEEP_INTERVAL));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        match registry.sweep() {
            Ok(count) => {
                if count > 0 {
                    info!("Sweep: pruned {} expired shares", count);
                }
            }
            Err(e) => {
                warn!("Sweep error: {}", e);
            }
        }
    }

    info!("Sweep loop stopped");
}
