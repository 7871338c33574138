//! Tile grid math: address validation, tile-local coordinates and buffered
//! boundaries

use super::schemes::{
    polar_pixels_to_metres, wrap_longitude, TileProjection, TileSchema, MAX_ZOOM,
    MERCATOR_MAX_LATITUDE,
};
use super::types::{Double2D, ProjectionError, TileAddress};

/// Check a tile address against the scheme's grid at its zoom level
pub fn validate_address(schema: TileSchema, addr: TileAddress) -> Result<(), ProjectionError> {
    if addr.z > MAX_ZOOM {
        return Err(ProjectionError::InvalidZoom(addr.z));
    }
    let columns = schema.columns() << addr.z;
    let rows = schema.rows() << addr.z;
    if addr.x >= columns || addr.y >= rows {
        return Err(ProjectionError::AddressOutOfRange {
            z: addr.z,
            x: addr.x,
            y: addr.y,
        });
    }
    Ok(())
}

/// Translate a global pixel coordinate into the local frame of a tile.
///
/// For schemes that wrap the antimeridian, a point whose direct translation
/// falls outside the buffered frame is re-expressed across the dateline when
/// the wrapped position lands inside `[-buffer, tile_size + buffer]`. Callers
/// must still omit points outside that window when encoding.
pub fn to_tile_local_xy(
    global: Double2D,
    schema: TileSchema,
    z: u32,
    x: u64,
    y: u64,
    tile_size: u32,
    buffer_size: u32,
) -> Double2D {
    let origin_x = (x * tile_size as u64) as f64;
    let origin_y = (y * tile_size as u64) as f64;
    let mut local_x = global.x - origin_x;
    let local_y = global.y - origin_y;

    if schema.wraps_dateline() {
        let world = TileProjection::new(schema, tile_size).global_extent(z).x;
        let lo = -(buffer_size as f64);
        let hi = (tile_size + buffer_size) as f64;
        if local_x < lo || local_x > hi {
            if local_x + world >= lo && local_x + world <= hi {
                local_x += world;
            } else if local_x - world >= lo && local_x - world <= hi {
                local_x -= world;
            }
        }
    }

    Double2D::new(local_x, local_y)
}

/// The buffered envelope of a tile as `[sw, ne]` in the scheme's geographic
/// units: degrees for the geographic schemes, native metres for the polar
/// ones.
///
/// The buffer extends `buffer_size / tile_size` of a tile width beyond each
/// edge. Longitudes wrap into [-180, 180] and latitudes clip to [-90, 90];
/// an envelope whose west edge is numerically greater than its east edge
/// crosses the antimeridian. At zoom 0 the geographic schemes return the
/// full world, since a wrapped buffer would otherwise collapse the envelope.
pub fn buffered_tile_boundary(
    z: u32,
    x: u64,
    y: u64,
    schema: TileSchema,
    tile_size: u32,
    buffer_size: u32,
) -> Result<[Double2D; 2], ProjectionError> {
    validate_address(schema, TileAddress::new(z, x, y))?;
    let buffer_fraction = buffer_size as f64 / tile_size as f64;

    match schema {
        TileSchema::Wgs84 => {
            if z == 0 {
                return Ok([Double2D::new(-180.0, -90.0), Double2D::new(180.0, 90.0)]);
            }
            let degrees_per_tile = 360.0 / (schema.columns() << z) as f64;
            let buffer = buffer_fraction * degrees_per_tile;

            let min_lng = degrees_per_tile * x as f64 - 180.0 - buffer;
            let max_lng = min_lng + degrees_per_tile + 2.0 * buffer;
            let max_lat = 90.0 - degrees_per_tile * y as f64 + buffer;
            let min_lat = max_lat - degrees_per_tile - 2.0 * buffer;

            Ok([
                Double2D::new(wrap_longitude(min_lng), min_lat.max(-90.0)),
                Double2D::new(wrap_longitude(max_lng), max_lat.min(90.0)),
            ])
        }
        TileSchema::WebMercator => {
            if z == 0 {
                return Ok([
                    Double2D::new(-180.0, -MERCATOR_MAX_LATITUDE),
                    Double2D::new(180.0, MERCATOR_MAX_LATITUDE),
                ]);
            }
            let proj = TileProjection::new(schema, tile_size);
            let extent = proj.global_extent(z);
            let buffer = buffer_fraction * tile_size as f64;

            let min_px = (x * tile_size as u64) as f64 - buffer;
            let max_px = min_px + tile_size as f64 + 2.0 * buffer;
            let min_py = (y * tile_size as u64) as f64 - buffer;
            let max_py = min_py + tile_size as f64 + 2.0 * buffer;

            let min_lng = wrap_longitude(min_px / extent.x * 360.0 - 180.0);
            let max_lng = wrap_longitude(max_px / extent.x * 360.0 - 180.0);
            // pixel Y grows southward
            let max_lat = inverse_mercator_latitude(min_py, extent.y);
            let min_lat = inverse_mercator_latitude(max_py, extent.y);

            Ok([
                Double2D::new(min_lng, min_lat.max(-90.0)),
                Double2D::new(max_lng, max_lat.min(90.0)),
            ])
        }
        TileSchema::ArcticLaea | TileSchema::AntarcticLaea => {
            let proj = TileProjection::new(schema, tile_size);
            let extent = proj.global_extent(z);
            let buffer = buffer_fraction * tile_size as f64;

            let min_px = (x * tile_size as u64) as f64 - buffer;
            let max_px = min_px + tile_size as f64 + 2.0 * buffer;
            let min_py = (y * tile_size as u64) as f64 - buffer;
            let max_py = min_py + tile_size as f64 + 2.0 * buffer;

            let (west, north) = polar_pixels_to_metres(min_px, min_py, extent);
            let (east, south) = polar_pixels_to_metres(max_px, max_py, extent);

            Ok([Double2D::new(west, south), Double2D::new(east, north)])
        }
    }
}

fn inverse_mercator_latitude(py: f64, extent_y: f64) -> f64 {
    let n = std::f64::consts::PI * (1.0 - 2.0 * py / extent_y);
    n.sinh().atan().to_degrees()
}
