//! Hexagonal binning
//!
//! Flat-topped hexagons in axial coordinates, anchored so the cell with
//! axial address (0, 0) is centred on the world's (0, 0) global pixel.

use std::collections::BTreeMap;

use super::{cell_id, to_local_polygon, BinError, BinnedCell, BinnedCells, PointSample};

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Bins point samples onto a hex lattice.
///
/// The hexagon side is `tile_size / hex_per_tile`, so `hex_per_tile`
/// controls the nominal number of columns across one tile.
pub struct HexBin {
    side: f64,
}

impl HexBin {
    pub fn new(tile_size: u32, hex_per_tile: u32) -> Self {
        Self {
            side: tile_size as f64 / hex_per_tile as f64,
        }
    }

    /// Assign each sample to the hexagon containing its centroid and merge
    /// per-year counts. `origin` is the tile's top-left corner in global
    /// pixels, used to express cell geometry in the tile-local frame.
    pub fn bin(
        &self,
        origin: (i64, i64),
        samples: &[PointSample],
    ) -> Result<BinnedCells, BinError> {
        if samples.is_empty() {
            return Err(BinError::NoData);
        }

        let mut by_axial: BTreeMap<(i64, i64), Vec<&PointSample>> = BTreeMap::new();
        for sample in samples {
            by_axial
                .entry(self.axial_at(sample.gx, sample.gy))
                .or_default()
                .push(sample);
        }

        let mut cells = BinnedCells::new();
        for ((q, r), members) in by_axial {
            let ring = self.vertices(q, r);
            let id = cell_id(ring[0]);
            let cell = cells.entry(id).or_insert_with(|| BinnedCell {
                geom: to_local_polygon(&ring, origin),
                total: 0,
                years: super::YearCounts::new(),
            });
            for sample in members {
                cell.absorb(sample);
            }
        }
        Ok(cells)
    }

    /// Axial cell address containing a global pixel coordinate
    fn axial_at(&self, gx: f64, gy: f64) -> (i64, i64) {
        let q = (2.0 / 3.0 * gx) / self.side;
        let r = (-1.0 / 3.0 * gx + SQRT_3 / 3.0 * gy) / self.side;
        axial_round(q, r)
    }

    /// The six vertices of a cell in rounded global pixels, starting from
    /// the eastern vertex and winding clockwise in screen space
    fn vertices(&self, q: i64, r: i64) -> [(i64, i64); 6] {
        let cx = self.side * 1.5 * q as f64;
        let cy = self.side * SQRT_3 * (r as f64 + q as f64 / 2.0);
        let mut out = [(0i64, 0i64); 6];
        for (k, slot) in out.iter_mut().enumerate() {
            let angle = std::f64::consts::FRAC_PI_3 * k as f64;
            *slot = (
                (cx + self.side * angle.cos()).round() as i64,
                (cy + self.side * angle.sin()).round() as i64,
            );
        }
        out
    }
}

/// Round fractional axial coordinates to the containing cell.
///
/// Cube rounding: the component with the largest rounding error is
/// recomputed from the other two, which resolves edge ties the same way for
/// every caller.
fn axial_round(q: f64, r: f64) -> (i64, i64) {
    let x = q;
    let z = r;
    let y = -x - z;

    let mut rx = x.round();
    let mut rz = z.round();
    let ry = y.round();

    let dx = (rx - x).abs();
    let dy = (ry - y).abs();
    let dz = (rz - z).abs();

    if dx > dy && dx > dz {
        rx = -ry - rz;
    } else if dy <= dz {
        rz = -rx - ry;
    }
    (rx as i64, rz as i64)
}
