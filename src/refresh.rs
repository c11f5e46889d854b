use std::time::Duration;

use tracing::{debug, info};

use crate::manager::ResourceManager;

/// Background task that periodically reloads resources from the source.
pub async fn run_refresher(manager: ResourceManager, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately; the initial load is the caller's.
    interval.tick().await;
    loop {
        interval.tick().await;
        match manager.refetch().await {
            Ok(resources) => info!("refreshed resources, {} top-level", resources.len()),
            Err(e) => {
                // A caller started a newer fetch meanwhile
                debug!("refresh skipped: {e}");
            }
        }
    }
}
