//! Tile assembly pipeline and HTTP surface

pub mod assembler;
pub mod cache;
pub mod params;
pub mod routes;
pub mod types;

pub use assembler::TileAssembler;
pub use cache::{TileCache, TileCacheConfig};
pub use routes::{admin_routes, occurrence_routes, AppState};
pub use types::{AssembleRequest, BinSpec, ErrorResponse, Filters, TileError, YearRange};
