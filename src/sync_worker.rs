use std::sync::Arc;
use std::time::Duration;

use crate::synchronizer::Synchronizer;

/// To be run as a separate task, alongside the API. Shares the API's
/// `Synchronizer`, so a scheduled run never overlaps with a `POST /sync`.
pub async fn init_sync_worker(
    synchronizer: Arc<Synchronizer>,
    interval: Duration,
) -> Result<(), anyhow::Error> {
    sync_loop(&synchronizer, interval).await
}

async fn sync_loop(
    synchronizer: &Synchronizer,
    interval: Duration,
) -> Result<(), anyhow::Error> {
    loop {
        // `synchronize` absorbs every failure, so the loop only ends with the
        // process
        let result = synchronizer.synchronize().await;
        tracing::info!(
            subscribe = %result.subscribe,
            unsubscribe = %result.unsubscribe,
            "sync run finished"
        );
        tokio::time::sleep(interval).await;
    }
}
