//! Mapbox Vector Tile codec
//!
//! Decoding and encoding with auto-scaling disabled: feature coordinates are
//! integers in the tile's own pixel frame, and `decode(encode(f)) == f` for
//! any feature set sharing one tile size.

pub mod decoder;
pub mod encoder;
pub mod proto;
pub mod types;

pub use decoder::decode;
pub use encoder::TileEncoder;
pub use types::{Attributes, CodecError, DecodedFeature, Geom, TagValue};
