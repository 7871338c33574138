//! Elasticsearch heatmap service
//!
//! Submits geotile-grid aggregations bounded by a buffered tile envelope and
//! year facet queries against the occurrence index.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::projection::Double2D;

use super::service::HeatmapService;
use super::types::{GridBucket, OccurrenceQuery, SearchError};

/// Geotile precision is finer than the tile zoom so several cells paint one
/// tile
const PRECISION_OFFSET: u32 = 6;
const MAX_PRECISION: u32 = 29;

/// Three centuries of data is enough for the year facet
const YEAR_FACET_SIZE: u32 = 300;

pub struct EsHeatmapService {
    base_url: String,
    index: String,
    http: reqwest::Client,
}

impl EsHeatmapService {
    pub fn new(base_url: &str, index: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Geotile precision for a tile zoom level
    pub fn precision_for_zoom(z: u32) -> u32 {
        (z + PRECISION_OFFSET).min(MAX_PRECISION)
    }

    async fn search<T: serde::de::DeserializeOwned>(
        &self,
        body: serde_json::Value,
    ) -> Result<T, SearchError> {
        debug!("search request: {}", body);
        let response = self
            .http
            .post(format!("{}/{}/_search", self.base_url, self.index))
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Backend(format!("search returned {status}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SearchError::Response(e.to_string()))
    }

    fn filter_clauses(query: &OccurrenceQuery) -> Vec<serde_json::Value> {
        query
            .terms
            .iter()
            .map(|(field, value)| json!({ "term": { field: value } }))
            .collect()
    }
}

#[async_trait]
impl HeatmapService for EsHeatmapService {
    async fn geogrid(
        &self,
        query: &OccurrenceQuery,
        bbox: [Double2D; 2],
        precision: u32,
    ) -> Result<Vec<GridBucket>, SearchError> {
        let [sw, ne] = bbox;
        let mut filters = Self::filter_clauses(query);
        filters.push(json!({
            "geo_bounding_box": {
                "coordinates": {
                    "top_left": { "lat": ne.y, "lon": sw.x },
                    "bottom_right": { "lat": sw.y, "lon": ne.x }
                }
            }
        }));

        let body = json!({
            "size": 0,
            "query": { "bool": { "filter": filters } },
            "aggs": {
                "grid": {
                    "geotile_grid": { "field": "coordinates", "precision": precision },
                }
            }
        });

        let response: GridResponse = self.search(body).await?;
        let buckets = response
            .aggregations
            .map(|a| a.grid.buckets)
            .unwrap_or_default();

        buckets
            .into_iter()
            .filter(|b| b.doc_count > 0)
            .map(|b| grid_bucket(&b.key, b.doc_count))
            .collect()
    }

    async fn year_facet(
        &self,
        query: &OccurrenceQuery,
    ) -> Result<BTreeMap<i32, i64>, SearchError> {
        let body = json!({
            "size": 0,
            "query": { "bool": { "filter": Self::filter_clauses(query) } },
            "aggs": {
                "years": {
                    "terms": { "field": "year", "size": YEAR_FACET_SIZE }
                }
            }
        });

        let response: YearResponse = self.search(body).await?;
        let mut counts = BTreeMap::new();
        if let Some(aggregations) = response.aggregations {
            for bucket in aggregations.years.buckets {
                let year = bucket
                    .key
                    .as_i64()
                    .or_else(|| bucket.key.as_str().and_then(|s| s.parse().ok()))
                    .ok_or_else(|| {
                        SearchError::Response(format!("non-numeric year key: {}", bucket.key))
                    })?;
                counts.insert(year as i32, bucket.doc_count);
            }
        }
        Ok(counts)
    }
}

/// Decode a geotile bucket key `"z/x/y"` into its WGS84 bounds
fn grid_bucket(key: &str, doc_count: i64) -> Result<GridBucket, SearchError> {
    let mut parts = key.split('/');
    let (Some(z), Some(x), Some(y), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SearchError::Response(format!("bad geotile key: {key}")));
    };
    let z: u32 = z
        .parse()
        .map_err(|_| SearchError::Response(format!("bad geotile key: {key}")))?;
    let x: f64 = x
        .parse()
        .map_err(|_| SearchError::Response(format!("bad geotile key: {key}")))?;
    let y: f64 = y
        .parse()
        .map_err(|_| SearchError::Response(format!("bad geotile key: {key}")))?;

    let tiles = (1u64 << z) as f64;
    let min_lng = x / tiles * 360.0 - 180.0;
    let max_lng = (x + 1.0) / tiles * 360.0 - 180.0;
    let max_lat = tile_edge_latitude(y, tiles);
    let min_lat = tile_edge_latitude(y + 1.0, tiles);

    Ok(GridBucket {
        min_lng,
        min_lat,
        max_lng,
        max_lat,
        doc_count,
    })
}

fn tile_edge_latitude(y: f64, tiles: f64) -> f64 {
    let n = std::f64::consts::PI * (1.0 - 2.0 * y / tiles);
    n.sinh().atan().to_degrees()
}

#[derive(Debug, Deserialize)]
struct GridResponse {
    #[serde(default)]
    aggregations: Option<GridAggregations>,
}

#[derive(Debug, Deserialize)]
struct YearResponse {
    #[serde(default)]
    aggregations: Option<YearAggregations>,
}

#[derive(Debug, Deserialize)]
struct GridAggregations {
    grid: Buckets<GridBucketRaw>,
}

#[derive(Debug, Deserialize)]
struct YearAggregations {
    years: Buckets<YearBucketRaw>,
}

#[derive(Debug, Deserialize)]
struct Buckets<T> {
    buckets: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct GridBucketRaw {
    key: String,
    doc_count: i64,
}

#[derive(Debug, Deserialize)]
struct YearBucketRaw {
    key: serde_json::Value,
    doc_count: i64,
}
