//! Projection types and error definitions

use thiserror::Error;

/// Errors from tile addressing and coordinate transforms
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Invalid zoom: {0}")]
    InvalidZoom(u32),

    #[error("Unknown spatial reference system: {0}")]
    UnknownSrs(String),

    #[error("Tile address out of range: z={z}, x={x}, y={y}")]
    AddressOutOfRange { z: u32, x: u64, y: u64 },
}

/// A point in a continuous 2D space (degrees, metres or pixels depending on
/// context)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Double2D {
    pub x: f64,
    pub y: f64,
}

impl Double2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A slippy-map tile address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub z: u32,
    pub x: u64,
    pub y: u64,
}

impl TileAddress {
    pub const fn new(z: u32, x: u64, y: u64) -> Self {
        Self { z, x, y }
    }
}

impl std::fmt::Display for TileAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}
