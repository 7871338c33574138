//! Regression surface over paired hex tiles
//!
//! Pairs cells from a target-taxon tile and a reference-taxon tile at the
//! same address, normalises per-year counts cell by cell, and fits a linear
//! regression whose statistics become feature attributes.

use std::collections::BTreeMap;

use serde_json::json;

use crate::binning::YearCounts;
use crate::mvt::{self, Attributes, CodecError, Geom, TagValue, TileEncoder};

use super::ols::SimpleRegression;

/// Output layer name
const REGRESSION_LAYER: &str = "regression";

/// Regression tile from two assembled hex tiles at the same address.
///
/// `origin` is the tile's top-left corner in global pixels, used to derive
/// cell identities; geometry is copied from the target tile.
pub fn regression_tile(
    target_tile: &[u8],
    reference_tile: &[u8],
    min_years: u64,
    origin: (i64, i64),
    tile_size: u32,
    buffer_size: u32,
) -> Result<Vec<u8>, CodecError> {
    let reference_counts = year_counts_by_cell(reference_tile, origin)?;
    let target_counts = year_counts_by_cell(target_tile, origin)?;
    let geometries = geometries_by_cell(target_tile, origin)?;

    let mut encoder = TileEncoder::new(tile_size, buffer_size);
    for (cell, target_years) in &target_counts {
        let Some(reference_years) = reference_counts.get(cell) else {
            continue;
        };
        let Some(geom) = geometries.get(cell) else {
            continue;
        };

        let (regression, paired_years) = fit(target_years, reference_years);
        if paired_years < min_years {
            continue;
        }

        let mut attrs = stats_attributes(&regression);
        attrs.insert("id".to_string(), TagValue::Str(cell.clone()));
        attrs.insert(
            "speciesCounts".to_string(),
            TagValue::Str(counts_json(target_years)),
        );
        attrs.insert(
            "groupCounts".to_string(),
            TagValue::Str(counts_json(reference_years)),
        );
        encoder.add_feature(REGRESSION_LAYER, &attrs, geom);
    }
    encoder.encode()
}

/// Regression metadata for the whole-filter JSON route
pub fn regression_meta(
    target_counts: &YearCounts,
    reference_counts: &YearCounts,
) -> serde_json::Value {
    let (regression, _) = fit(target_counts, reference_counts);
    json!({
        "slope": nullable(regression.slope()),
        "intercept": nullable(regression.intercept()),
        "significance": nullable(regression.significance()),
        "SSE": nullable(regression.sum_squared_errors()),
        "interceptStdErr": nullable(regression.intercept_std_err()),
        "meanSquareError": nullable(regression.mean_square_error()),
        "slopeStdErr": nullable(regression.slope_std_err()),
        "speciesCounts": counts_json(target_counts),
        "groupCounts": counts_json(reference_counts),
    })
}

/// Fit target/reference normalised counts over the years where the
/// reference is populated. Returns the regression and the number of paired
/// years.
fn fit(target: &YearCounts, reference: &YearCounts) -> (SimpleRegression, u64) {
    let mut regression = SimpleRegression::new();
    for (year, reference_count) in reference {
        if *reference_count > 0 {
            let target_count = target.get(year).copied().unwrap_or(0) as f64;
            regression.add_data(*year as f64, target_count / *reference_count as f64);
        }
    }
    let n = regression.n();
    (regression, n)
}

fn stats_attributes(regression: &SimpleRegression) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("slope".to_string(), TagValue::Double(regression.slope()));
    attrs.insert(
        "intercept".to_string(),
        TagValue::Double(regression.intercept()),
    );
    attrs.insert(
        "significance".to_string(),
        TagValue::Double(regression.significance()),
    );
    attrs.insert(
        "SSE".to_string(),
        TagValue::Double(regression.sum_squared_errors()),
    );
    attrs.insert(
        "interceptStdErr".to_string(),
        TagValue::Double(regression.intercept_std_err()),
    );
    attrs.insert(
        "meanSquareError".to_string(),
        TagValue::Double(regression.mean_square_error()),
    );
    attrs.insert(
        "slopeStdErr".to_string(),
        TagValue::Double(regression.slope_std_err()),
    );
    attrs
}

/// Year counts per cell id, merged by summation across layers
fn year_counts_by_cell(
    tile: &[u8],
    origin: (i64, i64),
) -> Result<BTreeMap<String, YearCounts>, CodecError> {
    let mut counts: BTreeMap<String, YearCounts> = BTreeMap::new();
    for feature in mvt::decode(tile)? {
        let Some(id) = feature_cell_id(&feature.geom, origin) else {
            continue;
        };
        let years = counts.entry(id).or_default();
        for (key, value) in &feature.attrs {
            if let (Ok(year), Some(count)) = (key.parse::<i32>(), value.as_i64()) {
                if year > 0 {
                    *years.entry(year).or_insert(0) += count;
                }
            }
        }
    }
    Ok(counts)
}

/// First geometry seen for each cell id
fn geometries_by_cell(
    tile: &[u8],
    origin: (i64, i64),
) -> Result<BTreeMap<String, Geom>, CodecError> {
    let mut geometries = BTreeMap::new();
    for feature in mvt::decode(tile)? {
        if let Some(id) = feature_cell_id(&feature.geom, origin) {
            geometries.entry(id).or_insert(feature.geom);
        }
    }
    Ok(geometries)
}

fn feature_cell_id(geom: &Geom, origin: (i64, i64)) -> Option<String> {
    let (x, y) = geom.first_vertex()?;
    Some(format!("{}:{}", origin.0 + x as i64, origin.1 + y as i64))
}

/// JSON object of year -> count, keys in ascending year order
fn counts_json(counts: &YearCounts) -> String {
    serde_json::to_string(counts).unwrap_or_else(|_| "{}".to_string())
}

fn nullable(value: f64) -> serde_json::Value {
    if value.is_finite() {
        json!(value)
    } else {
        serde_json::Value::Null
    }
}
