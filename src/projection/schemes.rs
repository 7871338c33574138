//! Named tile schemes and the lat/lng to global pixel transform

use super::types::{Double2D, ProjectionError};

/// Highest zoom level accepted anywhere in the pipeline
pub const MAX_ZOOM: u32 = 30;

/// Web Mercator latitude clamp
pub const MERCATOR_MAX_LATITUDE: f64 = 85.051_128_78;

/// GRS80 authalic sphere radius in metres, used by the polar equal-area
/// schemes
const AUTHALIC_RADIUS: f64 = 6_371_007.181;

/// Half-width of the polar scheme world square in native metres. The polar
/// aspect projects the opposite hemisphere onto a disc of radius 2R, and one
/// zoom-0 tile covers the bounding square of that disc.
const POLAR_EXTENT: f64 = 2.0 * AUTHALIC_RADIUS;

/// Central meridian of the arctic scheme (EPSG:3575, "Europe" aspect)
const ARCTIC_LON_0: f64 = 10.0;

/// Central meridian of the antarctic scheme
const ANTARCTIC_LON_0: f64 = 0.0;

/// The tile schemes served by this deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileSchema {
    /// EPSG:3857, one tile at zoom 0
    WebMercator,
    /// EPSG:4326 plate carrée, two tiles along longitude at zoom 0
    Wgs84,
    /// EPSG:3575, north polar azimuthal equal-area
    ArcticLaea,
    /// EPSG:3031, south polar azimuthal equal-area
    AntarcticLaea,
}

impl TileSchema {
    /// Resolve an `EPSG:nnnn` code to a scheme
    pub fn from_srs(srs: &str) -> Result<Self, ProjectionError> {
        match srs.to_ascii_uppercase().as_str() {
            "EPSG:3857" => Ok(Self::WebMercator),
            "EPSG:4326" => Ok(Self::Wgs84),
            "EPSG:3575" => Ok(Self::ArcticLaea),
            "EPSG:3031" => Ok(Self::AntarcticLaea),
            other => Err(ProjectionError::UnknownSrs(other.to_string())),
        }
    }

    /// The canonical SRS code
    pub fn srs(&self) -> &'static str {
        match self {
            Self::WebMercator => "EPSG:3857",
            Self::Wgs84 => "EPSG:4326",
            Self::ArcticLaea => "EPSG:3575",
            Self::AntarcticLaea => "EPSG:3031",
        }
    }

    /// Tiles along the X axis at zoom 0
    pub fn columns(&self) -> u64 {
        match self {
            Self::Wgs84 => 2,
            _ => 1,
        }
    }

    /// Tiles along the Y axis at zoom 0
    pub fn rows(&self) -> u64 {
        1
    }

    /// True if longitude wraps across the antimeridian in this scheme
    pub fn wraps_dateline(&self) -> bool {
        matches!(self, Self::WebMercator | Self::Wgs84)
    }
}

/// Projects geographic coordinates into global pixel space for one scheme at
/// a fixed tile size
#[derive(Debug, Clone, Copy)]
pub struct TileProjection {
    schema: TileSchema,
    tile_size: u32,
}

impl TileProjection {
    pub fn new(schema: TileSchema, tile_size: u32) -> Self {
        Self { schema, tile_size }
    }

    pub fn schema(&self) -> TileSchema {
        self.schema
    }

    /// Width and height of the global pixel space at a zoom level
    pub fn global_extent(&self, z: u32) -> Double2D {
        let tiles = 1u64 << z;
        Double2D::new(
            (self.tile_size as u64 * self.schema.columns() * tiles) as f64,
            (self.tile_size as u64 * self.schema.rows() * tiles) as f64,
        )
    }

    /// Project a geographic coordinate to global pixel space at a zoom level.
    ///
    /// Mercator clamps latitude to the projection's limit; WGS84 wraps
    /// longitude into [-180, 180].
    pub fn to_global_pixel_xy(
        &self,
        lat: f64,
        lng: f64,
        z: u32,
    ) -> Result<Double2D, ProjectionError> {
        if z > MAX_ZOOM {
            return Err(ProjectionError::InvalidZoom(z));
        }
        let extent = self.global_extent(z);

        Ok(match self.schema {
            TileSchema::WebMercator => {
                let lat = lat.clamp(-MERCATOR_MAX_LATITUDE, MERCATOR_MAX_LATITUDE);
                let siny = lat.to_radians().sin();
                let x = (lng + 180.0) / 360.0 * extent.x;
                let y = (0.5 - ((1.0 + siny) / (1.0 - siny)).ln() / (4.0 * std::f64::consts::PI))
                    * extent.y;
                Double2D::new(x, y)
            }
            TileSchema::Wgs84 => {
                let lng = wrap_longitude(lng);
                let x = (lng + 180.0) / 360.0 * extent.x;
                let y = (90.0 - lat) / 180.0 * extent.y;
                Double2D::new(x, y)
            }
            TileSchema::ArcticLaea => {
                let (xm, ym) = north_laea_metres(lat, lng);
                polar_metres_to_pixels(xm, ym, extent)
            }
            TileSchema::AntarcticLaea => {
                let (xm, ym) = south_laea_metres(lat, lng);
                polar_metres_to_pixels(xm, ym, extent)
            }
        })
    }
}

/// Wrap a longitude into [-180, 180]
pub fn wrap_longitude(lng: f64) -> f64 {
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid maps +180 to -180; keep the eastern edge addressable
    if wrapped == -180.0 && lng >= 180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Spherical Lambert azimuthal equal-area, north polar aspect, in metres
fn north_laea_metres(lat: f64, lng: f64) -> (f64, f64) {
    let phi = lat.to_radians();
    let dl = (lng - ARCTIC_LON_0).to_radians();
    let rho = 2.0 * AUTHALIC_RADIUS * (std::f64::consts::FRAC_PI_4 - phi / 2.0).sin();
    (rho * dl.sin(), -rho * dl.cos())
}

/// Spherical Lambert azimuthal equal-area, south polar aspect, in metres
fn south_laea_metres(lat: f64, lng: f64) -> (f64, f64) {
    let phi = lat.to_radians();
    let dl = (lng - ANTARCTIC_LON_0).to_radians();
    let rho = 2.0 * AUTHALIC_RADIUS * (std::f64::consts::FRAC_PI_4 - phi / 2.0).cos();
    (rho * dl.sin(), rho * dl.cos())
}

/// Map native polar metres onto the global pixel square, north-up
fn polar_metres_to_pixels(xm: f64, ym: f64, extent: Double2D) -> Double2D {
    let x = (xm + POLAR_EXTENT) / (2.0 * POLAR_EXTENT) * extent.x;
    let y = (POLAR_EXTENT - ym) / (2.0 * POLAR_EXTENT) * extent.y;
    Double2D::new(x, y)
}

/// Convert a global pixel coordinate back to native polar metres
pub(super) fn polar_pixels_to_metres(px: f64, py: f64, extent: Double2D) -> (f64, f64) {
    let xm = px / extent.x * 2.0 * POLAR_EXTENT - POLAR_EXTENT;
    let ym = POLAR_EXTENT - py / extent.y * 2.0 * POLAR_EXTENT;
    (xm, ym)
}
