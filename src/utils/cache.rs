use moka::future::Cache as MokaCache;
use std::time::Duration;
use uuid::Uuid;

/// Cache of assigned activation tokens to their listing ids. Safe to
/// cache because an assigned token never changes hands again.
#[derive(Clone)]
pub struct Cache {
    pub assigned_listing_cache: MokaCache<String, Uuid>,
}

impl Cache {
    pub fn new(ttl: u64, max_capacity: u64) -> Self {
        Self {
            assigned_listing_cache: MokaCache::builder()
                .time_to_live(Duration::from_secs(ttl))
                .max_capacity(max_capacity)
                .build(),
        }
    }
}
