//! Square binning
//!
//! A square lattice anchored at the world's (0, 0) global pixel; cell
//! `(i, j)` covers `[i·s, (i+1)·s) × [j·s, (j+1)·s)`.

use std::collections::BTreeMap;

use super::{cell_id, to_local_polygon, BinError, BinnedCell, BinnedCells, PointSample};

/// Bins point samples onto a square lattice with cells of `cell_size`
/// pixels.
pub struct SquareBin {
    cell_size: u32,
}

impl SquareBin {
    pub fn new(cell_size: u32) -> Self {
        Self { cell_size }
    }

    /// Assign each sample to its containing square and merge per-year
    /// counts. `origin` is the tile's top-left corner in global pixels.
    pub fn bin(
        &self,
        origin: (i64, i64),
        samples: &[PointSample],
    ) -> Result<BinnedCells, BinError> {
        if samples.is_empty() {
            return Err(BinError::NoData);
        }
        let s = self.cell_size as f64;

        let mut by_index: BTreeMap<(i64, i64), Vec<&PointSample>> = BTreeMap::new();
        for sample in samples {
            let i = (sample.gx / s).floor() as i64;
            let j = (sample.gy / s).floor() as i64;
            by_index.entry((i, j)).or_default().push(sample);
        }

        let mut cells = BinnedCells::new();
        for ((i, j), members) in by_index {
            let s = self.cell_size as i64;
            let ring = [
                (i * s, j * s),
                ((i + 1) * s, j * s),
                ((i + 1) * s, (j + 1) * s),
                (i * s, (j + 1) * s),
            ];
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
}
