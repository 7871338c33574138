//! Response cache for assembled tiles
//!
//! Caches encoded MVT bytes keyed by the canonical request, so repeated
//! viewport pans skip the store fan-out, decode and re-encode entirely.
//!
//! - Concurrent access without a global lock (sharded internally by moka)
//! - Size-based eviction counting payload bytes
//! - Hit/miss metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use metrics::{counter, gauge};
use moka::future::Cache;

/// Configuration for the tile response cache
#[derive(Debug, Clone)]
pub struct TileCacheConfig {
    /// Maximum cache size in bytes
    pub max_size_bytes: u64,
    /// Time-to-live; tiles are replaced wholesale by table switches, so
    /// this mainly bounds staleness between switches
    pub ttl: Duration,
    /// Evict entries not accessed for this duration
    pub tti: Duration,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 256 * 1024 * 1024,
            ttl: Duration::from_secs(3600),
            tti: Duration::from_secs(1800),
        }
    }
}

/// Thread-safe cache of encoded tile responses
pub struct TileCache {
    cache: Cache<String, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TileCache {
    pub fn new(config: TileCacheConfig) -> Self {
        let cache = Cache::builder()
            .weigher(|key: &String, value: &Bytes| -> u32 {
                (key.len() + value.len()).min(u32::MAX as usize) as u32
            })
            .max_capacity(config.max_size_bytes)
            .time_to_live(config.ttl)
            .time_to_idle(config.tti)
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let result = self.cache.get(key).await;

        if result.is_some() {
            let hits = self.hits.fetch_add(1, Ordering::Relaxed) + 1;
            counter!("occmaps_tile_cache_hits_total").increment(1);
            if hits % 100 == 0 {
                self.update_gauges();
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            counter!("occmaps_tile_cache_misses_total").increment(1);
        }

        result
    }

    pub async fn insert(&self, key: String, value: Bytes) {
        counter!("occmaps_tile_cache_bytes_inserted_total").increment(value.len() as u64);
        self.cache.insert(key, value).await;
    }

    fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    fn update_gauges(&self) {
        gauge!("occmaps_tile_cache_hit_rate").set(self.hit_rate());
        gauge!("occmaps_tile_cache_entry_count").set(self.cache.entry_count() as f64);
        gauge!("occmaps_tile_cache_size_bytes").set(self.cache.weighted_size() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn caches_and_returns_tile_bytes() {
        let cache = TileCache::new(TileCacheConfig::default());
        assert!(cache.get("k").await.is_none());

        cache.insert("k".to_string(), Bytes::from_static(b"tile")).await;
        assert_eq!(cache.get("k").await, Some(Bytes::from_static(b"tile")));
    }

    #[tokio::test]
    async fn tracks_hit_rate() {
        let cache = TileCache::new(TileCacheConfig::default());
        cache.get("k").await;
        assert_eq!(cache.hit_rate(), 0.0);

        cache.insert("k".to_string(), Bytes::from_static(b"v")).await;
        cache.get("k").await;
        assert_eq!(cache.hit_rate(), 0.5);
    }
}
