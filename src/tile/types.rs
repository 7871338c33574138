//! Tile pipeline types and error definitions

use std::collections::BTreeSet;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::binning::BinError;
use crate::meta::MetaError;
use crate::mvt::CodecError;
use crate::projection::{ProjectionError, TileAddress};
use crate::search::SearchError;
use crate::store::StoreError;

/// Errors surfaced by the tile assembly pipeline
#[derive(Debug, Error)]
pub enum TileError {
    #[error("{0}")]
    Validation(String),

    #[error("Backend failure: {0}")]
    Backend(String),

    #[error("Corrupt stored tile: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Request timed out")]
    Timeout,

    /// Internal marker, bypassed before responses are built
    #[error("No data")]
    NoData,
}

impl From<ProjectionError> for TileError {
    fn from(e: ProjectionError) -> Self {
        TileError::Validation(e.to_string())
    }
}

impl From<StoreError> for TileError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Decode(inner) => TileError::Codec(CodecError::Decode(inner)),
            other => TileError::Backend(other.to_string()),
        }
    }
}

impl From<MetaError> for TileError {
    fn from(e: MetaError) -> Self {
        TileError::Configuration(e.to_string())
    }
}

impl From<SearchError> for TileError {
    fn from(e: SearchError) -> Self {
        TileError::Backend(e.to_string())
    }
}

impl From<BinError> for TileError {
    fn from(_: BinError) -> Self {
        TileError::NoData
    }
}

/// Error response body for all routes
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<TileError> for ErrorResponse {
    fn from(e: TileError) -> Self {
        // backend and configuration details stay in the logs; responses
        // must not echo table names or row keys
        let (error, code) = match &e {
            TileError::Validation(message) => (message.clone(), "invalid_parameter"),
            TileError::Backend(_) => ("backend unavailable".to_string(), "backend_unavailable"),
            TileError::Codec(_) => ("corrupt stored tile".to_string(), "corrupt_tile"),
            TileError::Configuration(_) => ("service misconfigured".to_string(), "configuration"),
            TileError::Timeout => ("request timed out".to_string(), "timeout"),
            TileError::NoData => ("internal error".to_string(), "internal"),
        };
        Self {
            error,
            code: code.to_string(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "invalid_parameter" => StatusCode::BAD_REQUEST,
            "backend_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            "timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// An inclusive year range with optional bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearRange {
    pub start: Option<i32>,
    pub end: Option<i32>,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        self.start.map_or(true, |s| year >= s) && self.end.map_or(true, |e| year <= e)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Attribute filters applied while assembling a tile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub years: YearRange,
    /// Basis-of-record layer names to keep; empty keeps all layers
    pub basis_of_record: BTreeSet<String>,
    /// Preserve the per-year breakdown on output features
    pub verbose: bool,
}

impl Filters {
    /// True if a stored layer passes the basis-of-record filter
    pub fn keeps_layer(&self, layer: &str) -> bool {
        self.basis_of_record.is_empty() || self.basis_of_record.contains(layer)
    }
}

/// Requested re-binning of point features
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinSpec {
    Hex { hex_per_tile: u32 },
    Square { cell_size: u32 },
}

/// A fully parsed tile assembly request
#[derive(Debug, Clone)]
pub struct AssembleRequest {
    pub address: TileAddress,
    pub schema: crate::projection::TileSchema,
    pub map_key: String,
    pub filters: Filters,
    pub bin: Option<BinSpec>,
}
