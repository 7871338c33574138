//! Search adapter types and error definitions

use thiserror::Error;

/// Errors from the search backend
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search backend unavailable: {0}")]
    Backend(String),

    #[error("Unexpected search response: {0}")]
    Response(String),
}

/// An ad-hoc occurrence filter: field/value term predicates mirroring the
/// occurrence-search vocabulary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OccurrenceQuery {
    pub terms: Vec<(String, String)>,
}

impl OccurrenceQuery {
    pub fn new(terms: Vec<(String, String)>) -> Self {
        Self { terms }
    }

    /// Replace every term for `field` with a single value
    pub fn with_term(&self, field: &str, value: &str) -> Self {
        let mut terms: Vec<(String, String)> = self
            .terms
            .iter()
            .filter(|(f, _)| f != field)
            .cloned()
            .collect();
        terms.push((field.to_string(), value.to_string()));
        Self { terms }
    }
}

/// One geogrid aggregation bucket, bounds in WGS84 degrees
#[derive(Debug, Clone, PartialEq)]
pub struct GridBucket {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
    pub doc_count: i64,
}
