//! Salted fan-out over the partitioned tile and point tables

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::future::try_join_all;
use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::projection::Double2D;

use super::client::KvClient;
use super::points;
use super::row_key;
use super::types::{OccurrencePoint, StoreError};

/// Retry policy for transient store failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

/// Adapter over the key-value store that hides salting.
///
/// The salt byte is written by the producers and cannot be derived by
/// readers, so every lookup issues one get per salt value concurrently and
/// unions the results; exactly one bucket holds any given record.
pub struct SaltedTileStore {
    client: Arc<dyn KvClient>,
    salt_modulus: u8,
    retry: RetryPolicy,
}

impl SaltedTileStore {
    pub fn new(client: Arc<dyn KvClient>, salt_modulus: u8, retry: RetryPolicy) -> Self {
        Self {
            client,
            salt_modulus,
            retry,
        }
    }

    /// Fetch the encoded tile for an address, or `None` when absent
    pub async fn get_tile(
        &self,
        table: &str,
        map_key: &str,
        z: u32,
        x: u64,
        y: u64,
    ) -> Result<Option<Bytes>, StoreError> {
        let start = Instant::now();
        let lookups = (0..self.salt_modulus)
            .map(|salt| self.get_with_retry(table, row_key::tile_row(salt, map_key, z, x, y)));
        let results = try_join_all(lookups).await?;
        histogram!("occmaps_store_tile_fetch_seconds").record(start.elapsed());

        let hit = results.into_iter().flatten().next();
        debug!(
            "tile lookup {}/{}/{} across {} buckets: {}",
            z,
            x,
            y,
            self.salt_modulus,
            if hit.is_some() { "hit" } else { "miss" }
        );
        Ok(hit)
    }

    /// Scan the points table for a map key, keeping points inside the
    /// envelope. The envelope is `[sw, ne]` in degrees and may cross the
    /// antimeridian (west edge numerically greater than east).
    pub async fn get_points(
        &self,
        table: &str,
        map_key: &str,
        bbox: [Double2D; 2],
    ) -> Result<Vec<OccurrencePoint>, StoreError> {
        let lookups = (0..self.salt_modulus)
            .map(|salt| self.get_with_retry(table, row_key::point_row(salt, map_key)));
        let results = try_join_all(lookups).await?;

        let mut out = Vec::new();
        for batch in results.into_iter().flatten() {
            out.extend(
                points::decode_batch(&batch)?
                    .into_iter()
                    .filter(|p| envelope_contains(bbox, p.lat, p.lng)),
            );
        }
        Ok(out)
    }

    async fn get_with_retry(&self, table: &str, row: Vec<u8>) -> Result<Option<Bytes>, StoreError> {
        let mut delay = self.retry.base_delay;
        let mut last_error = None;

        for attempt in 0..self.retry.attempts {
            if attempt > 0 {
                counter!("occmaps_store_retries_total").increment(1);
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            match self.client.get(table, &row).await {
                Ok(value) => return Ok(value),
                Err(StoreError::Backend(message)) => {
                    warn!(
                        "store lookup attempt {}/{} failed: {}",
                        attempt + 1,
                        self.retry.attempts,
                        message
                    );
                    last_error = Some(message);
                }
                // corrupt data never heals by retrying
                Err(other) => return Err(other),
            }
        }

        counter!("occmaps_store_errors_total").increment(1);
        Err(StoreError::Backend(
            last_error.unwrap_or_else(|| "exhausted retries".to_string()),
        ))
    }
}

/// Point-in-envelope test, dateline aware
fn envelope_contains(bbox: [Double2D; 2], lat: f64, lng: f64) -> bool {
    let [sw, ne] = bbox;
    if lat < sw.y || lat > ne.y {
        return false;
    }
    if sw.x <= ne.x {
        lng >= sw.x && lng <= ne.x
    } else {
        // crosses the antimeridian
        lng >= sw.x || lng <= ne.x
    }
}
