//! HeatmapService trait definition

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::projection::Double2D;

use super::types::{GridBucket, OccurrenceQuery, SearchError};

/// Trait for the occurrence search backend used by the ad-hoc tile and
/// JSON regression routes
#[async_trait]
pub trait HeatmapService: Send + Sync {
    /// Geogrid aggregation bounded by a WGS84 envelope `[sw, ne]`
    async fn geogrid(
        &self,
        query: &OccurrenceQuery,
        bbox: [Double2D; 2],
        precision: u32,
    ) -> Result<Vec<GridBucket>, SearchError>;

    /// Occurrence counts faceted by year for a filter set
    async fn year_facet(
        &self,
        query: &OccurrenceQuery,
    ) -> Result<BTreeMap<i32, i64>, SearchError>;
}
