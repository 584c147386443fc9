use std::time::Duration;

use tracing::{debug, error};

use crate::store::{KvStore, StoreError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact the WAL if at least `threshold` records were appended since the
/// last compaction. Returns whether it compacted.
pub fn compact_if_needed(store: &KvStore, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.appends_since_compact()?;
    if appends < threshold {
        return Ok(false);
    }
    debug!(appends, threshold, "compacting WAL");
    store.compact()?;
    Ok(true)
}

/// Background task that periodically checks whether the WAL needs compacting.
pub async fn run_compactor(store: KvStore, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let store = store.clone();
        let result = tokio::task::spawn_blocking(move || compact_if_needed(&store, threshold)).await;
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("WAL compaction failed: {e}"),
            Err(e) => error!("WAL compaction task panicked: {e}"),
        }
    }
}
