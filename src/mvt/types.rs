//! Codec geometry and attribute types

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors raised while decoding or encoding vector tiles
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed tile: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Invalid geometry stream: {0}")]
    Geometry(String),

    #[error("Invalid feature tags: {0}")]
    Tags(String),

    #[error("Unsupported geometry type: {0}")]
    UnsupportedGeometry(i32),
}

/// A feature geometry in tile-local integer pixel space.
///
/// Coordinates may be negative or exceed the tile size when the feature lies
/// in the buffer region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Geom {
    /// One or more points
    Point(Vec<(i32, i32)>),
    /// Polygon rings; the first ring of each polygon is the exterior
    Polygon(Vec<Vec<(i32, i32)>>),
}

impl Geom {
    /// First vertex of the geometry, the anchor used for cell identity
    pub fn first_vertex(&self) -> Option<(i32, i32)> {
        match self {
            Geom::Point(pts) => pts.first().copied(),
            Geom::Polygon(rings) => rings.first().and_then(|r| r.first()).copied(),
        }
    }

    /// Arithmetic mean of the vertices, in tile-local space.
    ///
    /// For polygons the closing vertex is not stored, so every vertex of the
    /// exterior ring participates exactly once.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        let pts: &[(i32, i32)] = match self {
            Geom::Point(pts) => pts,
            Geom::Polygon(rings) => rings.first().map(Vec::as_slice)?,
        };
        if pts.is_empty() {
            return None;
        }
        let (sx, sy) = pts
            .iter()
            .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + *x as f64, sy + *y as f64));
        let n = pts.len() as f64;
        Some((sx / n, sy / n))
    }

    /// Bounding box `((min_x, min_y), (max_x, max_y))`
    pub fn bounds(&self) -> Option<((i32, i32), (i32, i32))> {
        let all: Vec<(i32, i32)> = match self {
            Geom::Point(pts) => pts.clone(),
            Geom::Polygon(rings) => rings.iter().flatten().copied().collect(),
        };
        let first = all.first()?;
        let mut min = *first;
        let mut max = *first;
        for (x, y) in &all {
            min.0 = min.0.min(*x);
            min.1 = min.1.min(*y);
            max.0 = max.0.max(*x);
            max.1 = max.1.max(*y);
        }
        Some((min, max))
    }
}

/// A decoded attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl TagValue {
    /// The integer content, if this value is integral
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TagValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// Attribute maps are ordered so encoded output is deterministic
pub type Attributes = BTreeMap<String, TagValue>;

/// A feature decoded from a tile
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFeature {
    pub layer: String,
    pub geom: Geom,
    pub attrs: Attributes,
}
