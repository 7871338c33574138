//! Test Utilities Module
//!
//! Provides fixtures shared by the integration tests: an in-memory
//! key-value store, a scriptable search backend and a router factory wired
//! to both.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use occmaps_server::binning::YearCounts;
use occmaps_server::meta::{StaticMetastore, TableNames};
use occmaps_server::mvt::{Attributes, Geom, TagValue, TileEncoder};
use occmaps_server::projection::Double2D;
use occmaps_server::search::{GridBucket, HeatmapService, OccurrenceQuery, SearchError};
use occmaps_server::store::{row_key, KvClient, RetryPolicy, SaltedTileStore, StoreError};
use occmaps_server::tile::{occurrence_routes, AppState, TileAssembler, TileCacheConfig};

pub const TILE_SIZE: u32 = 512;
pub const BUFFER_SIZE: u32 = 64;
pub const SALT_MODULUS: u8 = 4;

/// In-memory key-value store
#[derive(Default)]
pub struct MemoryKv {
    rows: Mutex<HashMap<(String, Vec<u8>), Bytes>>,
}

impl MemoryKv {
    /// Store a tile under an arbitrary salt bucket
    pub fn put_tile(&self, map_key: &str, z: u32, x: u64, y: u64, tile: Vec<u8>) {
        let salt = (z as u8 + 1) % SALT_MODULUS;
        self.rows.lock().unwrap().insert(
            ("tiles".to_string(), row_key::tile_row(salt, map_key, z, x, y)),
            Bytes::from(tile),
        );
    }
}

#[async_trait]
impl KvClient for MemoryKv {
    async fn get(&self, table: &str, row: &[u8]) -> Result<Option<Bytes>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(table.to_string(), row.to_vec()))
            .cloned())
    }
}

/// Scriptable search backend
#[derive(Default)]
pub struct MockHeatmap {
    pub buckets: Mutex<Vec<GridBucket>>,
    pub facets: Mutex<HashMap<String, YearCounts>>,
}

impl MockHeatmap {
    pub fn set_buckets(&self, buckets: Vec<GridBucket>) {
        *self.buckets.lock().unwrap() = buckets;
    }

    /// Script the year facet returned when the query carries
    /// `taxonKey=<key>`
    pub fn set_facet(&self, taxon_key: &str, counts: &[(i32, i64)]) {
        self.facets
            .lock()
            .unwrap()
            .insert(taxon_key.to_string(), counts.iter().copied().collect());
    }
}

#[async_trait]
impl HeatmapService for MockHeatmap {
    async fn geogrid(
        &self,
        _query: &OccurrenceQuery,
        _bbox: [Double2D; 2],
        _precision: u32,
    ) -> Result<Vec<GridBucket>, SearchError> {
        Ok(self.buckets.lock().unwrap().clone())
    }

    async fn year_facet(
        &self,
        query: &OccurrenceQuery,
    ) -> Result<BTreeMap<i32, i64>, SearchError> {
        let taxon = query
            .terms
            .iter()
            .find(|(field, _)| field == "taxonKey")
            .map(|(_, value)| value.clone())
            .unwrap_or_default();
        Ok(self
            .facets
            .lock()
            .unwrap()
            .get(&taxon)
            .cloned()
            .unwrap_or_default())
    }
}

/// Build the full router over in-memory backends
pub fn create_test_app() -> (Router, Arc<MemoryKv>, Arc<MockHeatmap>) {
    let kv = Arc::new(MemoryKv::default());
    let search = Arc::new(MockHeatmap::default());

    let store = SaltedTileStore::new(
        Arc::clone(&kv) as Arc<dyn KvClient>,
        SALT_MODULUS,
        RetryPolicy::default(),
    );
    let meta = Arc::new(StaticMetastore::new(TableNames::new("tiles", "points")));
    let assembler = Arc::new(TileAssembler::new(
        store,
        meta,
        TileCacheConfig::default(),
        TILE_SIZE,
        BUFFER_SIZE,
    ));

    let state = AppState {
        assembler,
        search: Arc::clone(&search) as Arc<dyn HeatmapService>,
        request_timeout: Duration::from_secs(5),
    };

    (occurrence_routes(state), kv, search)
}

/// Encode a stored-style density tile: point features with year attributes
/// in per-basis-of-record layers
pub fn encode_density_tile(features: &[((i32, i32), &str, &[(&str, i64)])]) -> Vec<u8> {
    let mut encoder = TileEncoder::new(TILE_SIZE, BUFFER_SIZE);
    for ((x, y), layer, attr_pairs) in features {
        let attrs: Attributes = attr_pairs
            .iter()
            .map(|(k, v)| (k.to_string(), TagValue::Int(*v)))
            .collect();
        encoder.add_feature(layer, &attrs, &Geom::Point(vec![(*x, *y)]));
    }
    encoder.encode().unwrap()
}
