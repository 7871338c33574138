//! Store adapter types and error definitions

use thiserror::Error;

/// Errors from the partitioned key-value store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unrecoverable backend failure, after retries
    #[error("Tile store unavailable: {0}")]
    Backend(String),

    /// A stored point batch that does not parse
    #[error("Corrupt stored record: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// An occurrence point decoded from the points table
#[derive(Debug, Clone, PartialEq)]
pub struct OccurrencePoint {
    pub lat: f64,
    pub lng: f64,
    /// Recorded year, absent when unknown
    pub year: Option<i32>,
    pub basis_of_record: String,
    pub count: i64,
}
