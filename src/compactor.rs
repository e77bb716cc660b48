use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::model::Ms;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites a tenant's WAL once enough appends have
/// accumulated. Retention bounds how long released bookings and finished
/// flights survive compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, retention_ms: Ms) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        maybe_compact(&engine, threshold, retention_ms).await;
    }
}

/// One sweep: compact when the append counter crosses the threshold.
/// Returns whether a compaction ran.
pub async fn maybe_compact(engine: &Engine, threshold: u64, retention_ms: Ms) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal(retention_ms).await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            tracing::warn!("WAL compaction failed: {e}");
            false
        }
    }
}
