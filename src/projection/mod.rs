//! Tile schemes and coordinate transforms
//!
//! Converts between geographic coordinates (lat/lng), global pixel space at a
//! zoom level, and tile-local pixel space for a fixed set of named tile
//! schemes.

pub mod grid;
pub mod schemes;
pub mod types;

pub use grid::{buffered_tile_boundary, to_tile_local_xy, validate_address};
pub use schemes::{TileProjection, TileSchema};
pub use types::{Double2D, ProjectionError, TileAddress};
