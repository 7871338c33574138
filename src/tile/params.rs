//! Query parameter parsing
//!
//! Shared by the density, ad-hoc and regression routes. Parameters mirror
//! the occurrence-search vocabulary; exactly one map-key predicate selects
//! the precomputed map to serve.

use crate::projection::TileSchema;
use crate::search::OccurrenceQuery;

use super::types::{BinSpec, Filters, TileError, YearRange};

/// Parameters that select a precomputed map, in `type:value` map-key form
const MAP_KEY_PARAMS: &[&str] = &[
    "taxonKey",
    "datasetKey",
    "country",
    "publishingOrg",
    "publishingCountry",
    "networkKey",
];

/// The all-records map served when no map-key predicate is present
const ALL_MAP_KEY: &str = "all:0";

/// Search predicates forwarded to the ad-hoc backend
const SEARCH_PARAMS: &[&str] = &[
    "taxonKey",
    "datasetKey",
    "country",
    "publishingOrg",
    "publishingCountry",
    "networkKey",
    "basisOfRecord",
    "year",
    "hasCoordinate",
    "hasGeospatialIssue",
    "establishmentMeans",
    "recordedBy",
    "institutionCode",
    "collectionCode",
];

pub const DEFAULT_HEX_PER_TILE: u32 = 35;
pub const DEFAULT_SQUARE_SIZE: u32 = 64;

/// Basis-of-record values suitable for trend analysis; excludes fossils and
/// living specimens
pub const SUITABLE_BASIS_OF_RECORDS: &[&str] = &[
    "UNKNOWN",
    "PRESERVED_SPECIMEN",
    "OBSERVATION",
    "HUMAN_OBSERVATION",
    "MACHINE_OBSERVATION",
    "MATERIAL_SAMPLE",
    "LITERATURE",
];

/// Decoded query string preserving repeated parameters
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    pub fn parse(query: Option<&str>) -> Self {
        let pairs = query
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self { pairs }
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse the `srs` parameter, defaulting per route
pub fn schema(params: &RequestParams, default_srs: &str) -> Result<TileSchema, TileError> {
    let srs = params.first("srs").unwrap_or(default_srs);
    TileSchema::from_srs(srs).map_err(|e| TileError::Validation(e.to_string()))
}

/// Parse the `{y}.mvt` path segment
pub fn tile_y(raw: &str) -> Result<u64, TileError> {
    raw.strip_suffix(".mvt")
        .unwrap_or(raw)
        .parse()
        .map_err(|_| TileError::Validation(format!("bad tile y: {raw}")))
}

/// Derive the map key from the request.
///
/// At most one map-key predicate is allowed; none selects the all-records
/// map.
pub fn map_key(params: &RequestParams) -> Result<String, TileError> {
    let mut found = None;
    for name in MAP_KEY_PARAMS {
        for value in params.all(name) {
            if found.is_some() {
                return Err(TileError::Validation(
                    "only one map key parameter may be provided".to_string(),
                ));
            }
            found = Some(format!("{name}:{value}"));
        }
    }
    Ok(found.unwrap_or_else(|| ALL_MAP_KEY.to_string()))
}

/// Parse a year range: `YYYY`, `YYYY,YYYY`, `,YYYY` or `YYYY,`
pub fn year_range(raw: &str) -> Result<YearRange, TileError> {
    let parse = |s: &str| -> Result<Option<i32>, TileError> {
        if s.is_empty() {
            return Ok(None);
        }
        s.parse()
            .map(Some)
            .map_err(|_| TileError::Validation(format!("bad year: {s}")))
    };

    match raw.split(',').collect::<Vec<_>>().as_slice() {
        [single] => {
            let year = parse(single)?;
            Ok(YearRange {
                start: year,
                end: year,
            })
        }
        [start, end] => {
            let range = YearRange {
                start: parse(start)?,
                end: parse(end)?,
            };
            if let (Some(s), Some(e)) = (range.start, range.end) {
                if s > e {
                    return Err(TileError::Validation(format!("empty year range: {raw}")));
                }
            }
            Ok(range)
        }
        _ => Err(TileError::Validation(format!("bad year range: {raw}"))),
    }
}

/// Parse the attribute filters shared by all tile routes
pub fn filters(params: &RequestParams) -> Result<Filters, TileError> {
    let years = match params.first("year") {
        Some(raw) => year_range(raw)?,
        None => YearRange::default(),
    };

    let basis_of_record = params
        .all("basisOfRecord")
        .flat_map(|v| v.split(','))
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .collect();

    let verbose = params
        .first("verbose")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);

    Ok(Filters {
        years,
        basis_of_record,
        verbose,
    })
}

/// Parse the optional `bin` parameter and its lattice sizing
pub fn bin_spec(params: &RequestParams) -> Result<Option<BinSpec>, TileError> {
    let positive = |name: &str, default: u32| -> Result<u32, TileError> {
        match params.first(name) {
            None => Ok(default),
            Some(raw) => match raw.parse() {
                Ok(v) if v > 0 => Ok(v),
                _ => Err(TileError::Validation(format!("bad {name}: {raw}"))),
            },
        }
    };

    match params.first("bin") {
        None => Ok(None),
        Some(mode) if mode.eq_ignore_ascii_case("hex") => Ok(Some(BinSpec::Hex {
            hex_per_tile: positive("hexPerTile", DEFAULT_HEX_PER_TILE)?,
        })),
        Some(mode) if mode.eq_ignore_ascii_case("square") => Ok(Some(BinSpec::Square {
            cell_size: positive("squareSize", DEFAULT_SQUARE_SIZE)?,
        })),
        Some(other) => Err(TileError::Validation(format!("unsupported bin mode: {other}"))),
    }
}

/// Collect search predicates for the ad-hoc backend
pub fn search_query(params: &RequestParams) -> OccurrenceQuery {
    let mut terms = Vec::new();
    for name in SEARCH_PARAMS {
        for value in params.all(name) {
            terms.push((name.to_string(), value.to_string()));
        }
    }
    OccurrenceQuery::new(terms)
}
