//! Long-running background task that rebuilds the aggregated pool listing
//! on a fixed interval and keeps the latest snapshot in memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregator::Aggregator;
use crate::models::PoolListing;

pub struct ListingCache {
    snapshot: RwLock<Option<PoolListing>>,
    /// Held while a request builds the first snapshot.
    filling: Mutex<()>,
}

impl ListingCache {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
            filling: Mutex::new(()),
        }
    }

    /// Latest snapshot, `None` until the first refresh completes.
    pub async fn get(&self) -> Option<PoolListing> {
        self.snapshot.read().await.clone()
    }

    pub async fn store(&self, listing: PoolListing) {
        *self.snapshot.write().await = Some(listing);
    }

    /// The snapshot, building it on demand if the refresher has not stored
    /// one yet. Concurrent callers wait for a single build.
    pub async fn get_or_fill(&self, aggregator: &Aggregator, now: u64) -> PoolListing {
        if let Some(listing) = self.get().await {
            return listing;
        }
        let _filling = self.filling.lock().await;
        if let Some(listing) = self.get().await {
            return listing;
        }
        info!("No snapshot yet; building one on demand");
        let listing = aggregator.list_pools(None, now).await;
        self.store(listing.clone()).await;
        listing
    }
}

impl Default for ListingCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Rebuild the snapshot once.
pub async fn refresh_once(aggregator: &Aggregator, cache: &ListingCache) {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let listing = aggregator.list_pools(None, now).await;
    if !listing.fetch_errors.is_empty() {
        warn!("Listing refreshed with {} fetch errors", listing.fetch_errors.len());
    }
    info!("Listing refreshed: {} pools", listing.pools.len());
    cache.store(listing).await;
}

/// Refresh loop; returns when `shutdown` is cancelled.
pub async fn run(
    aggregator: Arc<Aggregator>,
    cache: Arc<ListingCache>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!("Listing refresher starting — every {interval:?}");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = refresh_once(&aggregator, &cache) => {}
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    if cache.get().await.is_none() {
        error!("Listing refresher stopped before the first snapshot was built");
    }
    info!("Listing refresher stopped");
}
