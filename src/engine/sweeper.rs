//! Background expiry of cache entries and old history.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::TieredCache;

/// Run `TieredCache::sweep` every `every` until the handle is aborted.
/// The first sweep happens one full period after spawning.
pub fn spawn_sweeper(cache: Arc<TieredCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        info!(every_secs = every.as_secs(), "Cache sweeper started");
        loop {
            ticker.tick().await;
            let report = cache.sweep().await;
            debug!(?report, "Sweep tick");
        }
    })
}
