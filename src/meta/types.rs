//! Metastore types and error definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors resolving logical table names
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("No table mapping available")]
    Missing,

    #[error("Metastore source error: {0}")]
    Source(String),
}

/// Physical table names for the logical tiles and points tables.
///
/// Publishers replace tile data atomically by writing new tables and
/// updating this mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNames {
    pub tiles: String,
    pub points: String,
}

impl TableNames {
    pub fn new(tiles: &str, points: &str) -> Self {
        Self {
            tiles: tiles.to_string(),
            points: points.to_string(),
        }
    }
}
