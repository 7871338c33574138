//! Tile assembly
//!
//! Resolves the physical table, fetches the stored tile, applies year and
//! basis-of-record filters, optionally re-bins onto a lattice and
//! re-encodes. Falls back to the points table when no tile is stored for
//! the zoom/key combination.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::debug;

use crate::binning::{BinError, HexBin, PointSample, SquareBin, YearCounts};
use crate::meta::Metastore;
use crate::mvt::{self, Attributes, Geom, TagValue, TileEncoder};
use crate::projection::{
    buffered_tile_boundary, to_tile_local_xy, validate_address, Double2D, TileProjection,
};
use crate::store::SaltedTileStore;

use super::cache::{TileCache, TileCacheConfig};
use super::types::{AssembleRequest, BinSpec, Filters, TileError};

/// Output layer for density tiles
const OCCURRENCE_LAYER: &str = "occurrence";

/// A filtered feature ready for re-encoding, in tile-local space
#[derive(Debug, Clone)]
struct ProjectedFeature {
    geom: Geom,
    total: i64,
    years: YearCounts,
}

/// Orchestrates the tile assembly pipeline
pub struct TileAssembler {
    store: SaltedTileStore,
    meta: Arc<dyn Metastore>,
    cache: TileCache,
    tile_size: u32,
    buffer_size: u32,
}

impl TileAssembler {
    pub fn new(
        store: SaltedTileStore,
        meta: Arc<dyn Metastore>,
        cache_config: TileCacheConfig,
        tile_size: u32,
        buffer_size: u32,
    ) -> Self {
        Self {
            store,
            meta,
            cache: TileCache::new(cache_config),
            tile_size,
            buffer_size,
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Assemble the response tile for a parsed request
    pub async fn assemble(&self, req: &AssembleRequest) -> Result<Bytes, TileError> {
        validate_address(req.schema, req.address)?;
        let tables = self.meta.tables()?;

        let cache_key = cache_key(req, &tables.tiles);
        if let Some(hit) = self.cache.get(&cache_key).await {
            return Ok(hit);
        }

        counter!("occmaps_tile_requests_total").increment(1);
        let addr = req.address;
        let raw = self
            .store
            .get_tile(&tables.tiles, &req.map_key, addr.z, addr.x, addr.y)
            .await?;

        let features = match raw {
            Some(bytes) => {
                let start = Instant::now();
                let decoded = mvt::decode(&bytes)?;
                histogram!("occmaps_tile_phase_duration_seconds", "phase" => "decode")
                    .record(start.elapsed());
                project_features(decoded, &req.filters)
            }
            None => {
                debug!("no stored tile for {} at {}, trying points", req.map_key, addr);
                self.points_features(&tables.points, req).await?
            }
        };

        let start = Instant::now();
        let bytes = Bytes::from(self.encode(req, features)?);
        histogram!("occmaps_tile_phase_duration_seconds", "phase" => "encode")
            .record(start.elapsed());

        self.cache.insert(cache_key, bytes.clone()).await;
        Ok(bytes)
    }

    /// Build pixel features from the points table, for zoom/key
    /// combinations with no precomputed tile
    async fn points_features(
        &self,
        points_table: &str,
        req: &AssembleRequest,
    ) -> Result<Vec<ProjectedFeature>, TileError> {
        let addr = req.address;
        // polar schemes have metre-unit envelopes; scan the world and rely
        // on the local-frame window instead
        let bbox = if req.schema.wraps_dateline() {
            buffered_tile_boundary(
                addr.z,
                addr.x,
                addr.y,
                req.schema,
                self.tile_size,
                self.buffer_size,
            )?
        } else {
            [Double2D::new(-180.0, -90.0), Double2D::new(180.0, 90.0)]
        };

        let points = self
            .store
            .get_points(points_table, &req.map_key, bbox)
            .await?;

        let projection = TileProjection::new(req.schema, self.tile_size);
        let lo = -(self.buffer_size as f64);
        let hi = (self.tile_size + self.buffer_size) as f64;

        let mut merged: BTreeMap<(i32, i32), ProjectedFeature> = BTreeMap::new();
        for point in points {
            if !req.filters.keeps_layer(&point.basis_of_record) {
                continue;
            }
            match point.year {
                Some(year) if req.filters.years.contains(year) => {}
                None if req.filters.years.is_unbounded() => {}
                _ => continue,
            }

            let global = projection.to_global_pixel_xy(point.lat, point.lng, addr.z)?;
            let local = to_tile_local_xy(
                global,
                req.schema,
                addr.z,
                addr.x,
                addr.y,
                self.tile_size,
                self.buffer_size,
            );
            if local.x < lo || local.x > hi || local.y < lo || local.y > hi {
                continue;
            }

            let pixel = (local.x.floor() as i32, local.y.floor() as i32);
            let feature = merged.entry(pixel).or_insert_with(|| ProjectedFeature {
                geom: Geom::Point(vec![pixel]),
                total: 0,
                years: YearCounts::new(),
            });
            feature.total += point.count;
            if let Some(year) = point.year {
                *feature.years.entry(year).or_insert(0) += point.count;
            }
        }

        Ok(merged.into_values().collect())
    }

    /// Re-encode features, re-binned when requested. Empty input bypasses
    /// binning so the response is a valid empty tile.
    fn encode(
        &self,
        req: &AssembleRequest,
        features: Vec<ProjectedFeature>,
    ) -> Result<Vec<u8>, TileError> {
        let mut encoder = TileEncoder::new(self.tile_size, self.buffer_size);

        match req.bin {
            _ if features.is_empty() => {}
            None => {
                for feature in &features {
                    encoder.add_feature(
                        OCCURRENCE_LAYER,
                        &feature_attributes(feature.total, &feature.years, req.filters.verbose),
                        &feature.geom,
                    );
                }
            }
            Some(spec) => {
                let origin = tile_origin(req, self.tile_size);
                let samples = to_samples(&features, origin);
                let start = Instant::now();
                let binned = match spec {
                    BinSpec::Hex { hex_per_tile } => {
                        HexBin::new(self.tile_size, hex_per_tile).bin(origin, &samples)
                    }
                    BinSpec::Square { cell_size } => {
                        SquareBin::new(cell_size).bin(origin, &samples)
                    }
                };
                histogram!("occmaps_tile_phase_duration_seconds", "phase" => "bin")
                    .record(start.elapsed());

                match binned {
                    Ok(cells) => {
                        for cell in cells.values() {
                            encoder.add_feature(
                                OCCURRENCE_LAYER,
                                &feature_attributes(cell.total, &cell.years, req.filters.verbose),
                                &cell.geom,
                            );
                        }
                    }
                    // unreachable with the emptiness check above; an empty
                    // tile is still the right answer
                    Err(BinError::NoData) => {}
                }
            }
        }

        Ok(encoder.encode()?)
    }
}

/// Sum year-keyed attributes passing the filters into per-feature counts
/// and merge features sharing a first vertex across source layers
fn project_features(
    decoded: Vec<mvt::DecodedFeature>,
    filters: &Filters,
) -> Vec<ProjectedFeature> {
    let mut merged: BTreeMap<(i32, i32), ProjectedFeature> = BTreeMap::new();

    for feature in decoded {
        if !filters.keeps_layer(&feature.layer) {
            continue;
        }
        let years = filtered_year_counts(&feature.attrs, filters);
        let total: i64 = years.values().sum();
        if total == 0 {
            continue;
        }
        let Some(anchor) = feature.geom.first_vertex() else {
            continue;
        };

        match merged.entry(anchor) {
            Entry::Vacant(slot) => {
                slot.insert(ProjectedFeature {
                    geom: feature.geom,
                    total,
                    years,
                });
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.total += total;
                for (year, count) in years {
                    *existing.years.entry(year).or_insert(0) += count;
                }
            }
        }
    }

    merged.into_values().collect()
}

/// Keep attribute entries that look like `year -> count`. Stored tiles also
/// carry `BASIS_OF_RECORD_*` totals; anything whose key is not a positive
/// integer is discarded here.
fn filtered_year_counts(attrs: &Attributes, filters: &Filters) -> YearCounts {
    let mut years = YearCounts::new();
    for (key, value) in attrs {
        let Ok(year) = key.parse::<i32>() else {
            continue;
        };
        if year <= 0 || !filters.years.contains(year) {
            continue;
        }
        if let Some(count) = value.as_i64() {
            *years.entry(year).or_insert(0) += count;
        }
    }
    years
}

fn feature_attributes(total: i64, years: &YearCounts, verbose: bool) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("total".to_string(), TagValue::Int(total));
    if verbose {
        for (year, count) in years {
            attrs.insert(year.to_string(), TagValue::Int(*count));
        }
    }
    attrs
}

fn tile_origin(req: &AssembleRequest, tile_size: u32) -> (i64, i64) {
    (
        (req.address.x * tile_size as u64) as i64,
        (req.address.y * tile_size as u64) as i64,
    )
}

fn to_samples(features: &[ProjectedFeature], origin: (i64, i64)) -> Vec<PointSample> {
    features
        .iter()
        .filter_map(|feature| {
            let (cx, cy) = feature.geom.centroid()?;
            Some(PointSample {
                gx: origin.0 as f64 + cx,
                gy: origin.1 as f64 + cy,
                total: feature.total,
                years: feature.years.clone(),
            })
        })
        .collect()
}

/// Canonical cache key; includes the physical table so a metastore switch
/// rolls the cache within its bounded delay
fn cache_key(req: &AssembleRequest, tiles_table: &str) -> String {
    use std::fmt::Write;

    let mut key = String::with_capacity(96);
    let _ = write!(
        key,
        "{}|{}|{}|{}|{:?}:{:?}|",
        tiles_table,
        req.schema.srs(),
        req.map_key,
        req.address,
        req.filters.years.start,
        req.filters.years.end,
    );
    for bor in &req.filters.basis_of_record {
        let _ = write!(key, "{bor},");
    }
    let _ = write!(key, "|{}|{:?}", req.filters.verbose, req.bin);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{StaticMetastore, TableNames};
    use crate::projection::{TileAddress, TileSchema};
    use crate::store::{KvClient, RetryPolicy, StoreError};
    use crate::tile::types::YearRange;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryKv {
        rows: Mutex<HashMap<(String, Vec<u8>), Bytes>>,
    }

    impl MemoryKv {
        fn put(&self, table: &str, row: Vec<u8>, value: Vec<u8>) {
            self.rows
                .lock()
                .unwrap()
                .insert((table.to_string(), row), Bytes::from(value));
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

    fn stored_tile(features: &[((i32, i32), &str, &[(&str, i64)])]) -> Vec<u8> {
        let mut encoder = TileEncoder::new(512, 64);
        for ((x, y), layer, attrs) in features {
            let attrs: Attributes = attrs
                .iter()
                .map(|(k, v)| (k.to_string(), TagValue::Int(*v)))
                .collect();
            encoder.add_feature(layer, &attrs, &Geom::Point(vec![(*x, *y)]));
        }
        encoder.encode().unwrap()
    }

    fn assembler_with(kv: MemoryKv) -> TileAssembler {
        let store = SaltedTileStore::new(Arc::new(kv), 4, RetryPolicy::default());
        let meta = Arc::new(StaticMetastore::new(TableNames::new("tiles", "points")));
        TileAssembler::new(store, meta, TileCacheConfig::default(), 512, 64)
    }

    fn request(filters: Filters, bin: Option<BinSpec>) -> AssembleRequest {
        AssembleRequest {
            address: TileAddress::new(0, 0, 0),
            schema: TileSchema::WebMercator,
            map_key: "taxonKey:212".to_string(),
            filters,
            bin,
        }
    }

    fn put_tile(kv: &MemoryKv, map_key: &str, tile: Vec<u8>) {
        kv.put(
            "tiles",
            crate::store::row_key::tile_row(2, map_key, 0, 0, 0),
            tile,
        );
    }

    #[tokio::test]
    async fn missing_data_yields_a_valid_empty_tile() {
        let assembler = assembler_with(MemoryKv::default());
        let bytes = assembler
            .assemble(&request(Filters::default(), None))
            .await
            .unwrap();
        assert!(bytes.len() <= 4);
        assert!(mvt::decode(&bytes).unwrap().is_empty());
    }

    #[tokio::test]
    async fn passthrough_preserves_features() {
        let kv = MemoryKv::default();
        put_tile(
            &kv,
            "taxonKey:212",
            stored_tile(&[
                ((10, 10), "OBSERVATION", &[("2000", 4)]),
                ((20, 20), "OBSERVATION", &[("2001", 2)]),
                ((30, 30), "PRESERVED_SPECIMEN", &[("1990", 1)]),
            ]),
        );
        let assembler = assembler_with(kv);
        let bytes = assembler
            .assemble(&request(Filters::default(), None))
            .await
            .unwrap();

        let features = mvt::decode(&bytes).unwrap();
        assert_eq!(features.len(), 3);
        assert!(features.iter().all(|f| f.layer == "occurrence"));
        let totals: i64 = features
            .iter()
            .map(|f| f.attrs["total"].as_i64().unwrap())
            .sum();
        assert_eq!(totals, 7);
    }

    #[tokio::test]
    async fn year_filter_sums_the_selected_range() {
        let kv = MemoryKv::default();
        put_tile(
            &kv,
            "taxonKey:212",
            stored_tile(&[(
                (10, 10),
                "OBSERVATION",
                &[("1990", 10), ("2000", 20), ("2010", 30), ("BASIS_OF_RECORD_OBSERVATION", 60)],
            )]),
        );
        let assembler = assembler_with(kv);

        let filters = Filters {
            years: YearRange {
                start: Some(2000),
                end: Some(2010),
            },
            verbose: true,
            ..Filters::default()
        };
        let bytes = assembler.assemble(&request(filters, None)).await.unwrap();
        let features = mvt::decode(&bytes).unwrap();
        assert_eq!(features.len(), 1);
        let attrs = &features[0].attrs;
        assert_eq!(attrs["total"].as_i64(), Some(50));
        assert_eq!(attrs["2000"].as_i64(), Some(20));
        assert_eq!(attrs["2010"].as_i64(), Some(30));
        assert!(!attrs.contains_key("1990"));
        assert!(!attrs.contains_key("BASIS_OF_RECORD_OBSERVATION"));
    }

    #[tokio::test]
    async fn basis_of_record_filter_drops_layers() {
        let kv = MemoryKv::default();
        put_tile(
            &kv,
            "taxonKey:212",
            stored_tile(&[
                ((10, 10), "OBSERVATION", &[("2000", 4)]),
                ((10, 10), "FOSSIL_SPECIMEN", &[("2000", 9)]),
            ]),
        );
        let assembler = assembler_with(kv);

        let mut filters = Filters::default();
        filters.basis_of_record.insert("OBSERVATION".to_string());
        let bytes = assembler.assemble(&request(filters, None)).await.unwrap();
        let features = mvt::decode(&bytes).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].attrs["total"].as_i64(), Some(4));
    }

    #[tokio::test]
    async fn layers_merge_by_shared_pixel() {
        let kv = MemoryKv::default();
        put_tile(
            &kv,
            "taxonKey:212",
            stored_tile(&[
                ((10, 10), "OBSERVATION", &[("2000", 4)]),
                ((10, 10), "PRESERVED_SPECIMEN", &[("2000", 6)]),
            ]),
        );
        let assembler = assembler_with(kv);
        let bytes = assembler
            .assemble(&request(Filters::default(), None))
            .await
            .unwrap();
        let features = mvt::decode(&bytes).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].attrs["total"].as_i64(), Some(10));
    }

    #[tokio::test]
    async fn hex_binning_aggregates_a_cluster() {
        let kv = MemoryKv::default();
        let cluster: Vec<((i32, i32), &str, &[(&str, i64)])> = (0..100)
            .map(|i| ((200 + (i % 3), 300 + (i % 2)), "OBSERVATION", &[("2000", 1i64)] as &[_]))
            .collect();
        put_tile(&kv, "taxonKey:212", stored_tile(&cluster));
        let assembler = assembler_with(kv);

        let filters = Filters {
            verbose: true,
            ..Filters::default()
        };
        let bytes = assembler
            .assemble(&request(filters, Some(BinSpec::Hex { hex_per_tile: 35 })))
            .await
            .unwrap();
        let features = mvt::decode(&bytes).unwrap();
        assert_eq!(features.len(), 1);
        let feature = &features[0];
        assert!(matches!(&feature.geom, Geom::Polygon(rings) if rings[0].len() == 6));
        // the cluster occupies six distinct pixels, one hexagon
        assert_eq!(feature.attrs["total"].as_i64(), Some(100));
        assert_eq!(feature.attrs["2000"].as_i64(), Some(100));
    }

    #[tokio::test]
    async fn square_binning_uses_the_requested_cell_size() {
        let kv = MemoryKv::default();
        put_tile(
            &kv,
            "taxonKey:212",
            stored_tile(&[
                ((10, 10), "OBSERVATION", &[("2000", 1)]),
                ((400, 400), "OBSERVATION", &[("2000", 2)]),
            ]),
        );
        let assembler = assembler_with(kv);
        let bytes = assembler
            .assemble(&request(
                Filters::default(),
                Some(BinSpec::Square { cell_size: 64 }),
            ))
            .await
            .unwrap();
        let features = mvt::decode(&bytes).unwrap();
        assert_eq!(features.len(), 2);
        assert!(features
            .iter()
            .all(|f| matches!(&f.geom, Geom::Polygon(rings) if rings[0].len() == 4)));
    }

    #[tokio::test]
    async fn binning_an_empty_tile_returns_the_empty_tile() {
        let assembler = assembler_with(MemoryKv::default());
        let bytes = assembler
            .assemble(&request(
                Filters::default(),
                Some(BinSpec::Hex { hex_per_tile: 35 }),
            ))
            .await
            .unwrap();
        assert!(mvt::decode(&bytes).unwrap().is_empty());
    }

    #[tokio::test]
    async fn determinism_across_repeated_assembly() {
        let kv = MemoryKv::default();
        let spread: Vec<((i32, i32), &str, &[(&str, i64)])> = (0..50)
            .map(|i| {
                (
                    (i * 9 % 512, i * 17 % 512),
                    "OBSERVATION",
                    &[("2000", 1i64), ("2001", 2)] as &[_],
                )
            })
            .collect();
        put_tile(&kv, "taxonKey:212", stored_tile(&spread));
        let assembler = assembler_with(kv);

        let req = request(
            Filters {
                verbose: true,
                ..Filters::default()
            },
            Some(BinSpec::Hex { hex_per_tile: 35 }),
        );
        let a = assembler.assemble(&req).await.unwrap();
        let b = assembler.assemble(&req).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn invalid_address_is_a_validation_error() {
        let assembler = assembler_with(MemoryKv::default());
        let mut req = request(Filters::default(), None);
        req.address = TileAddress::new(2, 9, 0);
        assert!(matches!(
            assembler.assemble(&req).await,
            Err(TileError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn falls_back_to_points_when_no_tile_is_stored() {
        use crate::store::points::{PointBatch, StoredPoint};
        use prost::Message;

        let kv = MemoryKv::default();
        let batch = PointBatch {
            points: vec![StoredPoint {
                lat: 0.0,
                lng: 0.0,
                year: 2000,
                basis_of_record: "OBSERVATION".to_string(),
                count: 5,
            }],
        };
        kv.put(
            "points",
            crate::store::row_key::point_row(1, "taxonKey:212"),
            batch.encode_to_vec(),
        );
        let assembler = assembler_with(kv);
        let bytes = assembler
            .assemble(&request(Filters::default(), None))
            .await
            .unwrap();
        let features = mvt::decode(&bytes).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].attrs["total"].as_i64(), Some(5));
        // (0, 0) lat/lng is the centre of the zoom-0 mercator tile
        assert_eq!(features[0].geom, Geom::Point(vec![(256, 256)]));
    }
}
