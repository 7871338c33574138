//! Re-binning of point features onto global lattices
//!
//! Hex and square lattices are anchored at the world's (0, 0) global pixel,
//! so a cell has the same geometry and identity from whichever tile it is
//! computed, including across buffer regions.

pub mod hex;
pub mod square;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::mvt::Geom;

pub use hex::HexBin;
pub use square::SquareBin;

/// Per-year occurrence counts, ordered by year
pub type YearCounts = BTreeMap<i32, i64>;

/// Errors from the binning engine
#[derive(Debug, Error)]
pub enum BinError {
    /// The input tile has no point features. Callers bypass binning for
    /// empty input rather than surfacing this.
    #[error("No features to bin")]
    NoData,
}

/// A point feature to be assigned to a lattice cell, in global pixel space
#[derive(Debug, Clone)]
pub struct PointSample {
    pub gx: f64,
    pub gy: f64,
    pub total: i64,
    pub years: YearCounts,
}

/// An aggregated lattice cell with tile-local geometry
#[derive(Debug, Clone)]
pub struct BinnedCell {
    pub geom: Geom,
    pub total: i64,
    pub years: YearCounts,
}

impl BinnedCell {
    fn absorb(&mut self, sample: &PointSample) {
        self.total += sample.total;
        for (year, count) in &sample.years {
            *self.years.entry(*year).or_insert(0) += count;
        }
    }
}

/// Cells keyed by their stable identity, ordered for deterministic encoding
pub type BinnedCells = BTreeMap<String, BinnedCell>;

/// Identity of a cell: the global pixel address of its first vertex
pub(crate) fn cell_id(v0_global: (i64, i64)) -> String {
    format!("{}:{}", v0_global.0, v0_global.1)
}

/// Translate a polygon from rounded global pixels to the tile-local frame
pub(crate) fn to_local_polygon(ring_global: &[(i64, i64)], origin: (i64, i64)) -> Geom {
    Geom::Polygon(vec![ring_global
        .iter()
        .map(|(gx, gy)| ((gx - origin.0) as i32, (gy - origin.1) as i32))
        .collect()])
}
