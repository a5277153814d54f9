//! Uniform-bin cell locator.
//!
//! Accelerates repeated containing-cell queries over an unstructured
//! dataset: cells are bucketed once by bounding box into a regular bin
//! grid, and a query inspects only the bin its point falls into.

use glam::DVec3;

use crate::cell::Cell;
use crate::dataset::{Dataset, FoundCell};

/// Cap on bins per axis; beyond this the memory cost outruns the benefit.
const MAX_DIVISIONS: usize = 64;

/// Spatial index over a dataset's cells.
pub struct CellLocator<'a, D: Dataset + ?Sized> {
    dataset: &'a D,
    bounds_min: DVec3,
    inv_bin_size: DVec3,
    divisions: [usize; 3],
    bins: Vec<Vec<u32>>,
}

impl<'a, D: Dataset + ?Sized> CellLocator<'a, D> {
    /// Builds the locator over all cells of `dataset`.
    #[must_use]
    pub fn build(dataset: &'a D) -> Self {
        let (min, max) = dataset.bounding_box();
        // pad so boundary cells land strictly inside the bin grid
        let pad = (max - min).max_element().max(1.0) * 1e-6;
        let bounds_min = min - DVec3::splat(pad);
        let ext = (max - min) + DVec3::splat(2.0 * pad);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let per_axis = ((dataset.num_cells() as f64).cbrt().ceil() as usize)
            .clamp(1, MAX_DIVISIONS);
        let divisions = [per_axis, per_axis, per_axis];

        #[allow(clippy::cast_precision_loss)]
        let inv_bin_size = DVec3::new(
            divisions[0] as f64 / ext.x,
            divisions[1] as f64 / ext.y,
            divisions[2] as f64 / ext.z,
        );

        let mut locator = Self {
            dataset,
            bounds_min,
            inv_bin_size,
            divisions,
            bins: vec![Vec::new(); divisions[0] * divisions[1] * divisions[2]],
        };

        for cell_id in 0..dataset.num_cells() {
            let (cmin, cmax) = dataset.cell(cell_id).bounding_box();
            let lo = locator.bin_coords(cmin);
            let hi = locator.bin_coords(cmax);
            for k in lo[2]..=hi[2] {
                for j in lo[1]..=hi[1] {
                    for i in lo[0]..=hi[0] {
                        let b = locator.bin_index(i, j, k);
                        #[allow(clippy::cast_possible_truncation)]
                        locator.bins[b].push(cell_id as u32);
                    }
                }
            }
        }
        log::debug!(
            "cell locator: {} cells into {}^3 bins",
            dataset.num_cells(),
            per_axis
        );
        locator
    }

    fn bin_coords(&self, p: DVec3) -> [usize; 3] {
        let t = (p - self.bounds_min) * self.inv_bin_size;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let clamp = |v: f64, n: usize| -> usize { (v.floor().max(0.0) as usize).min(n - 1) };
        [
            clamp(t.x, self.divisions[0]),
            clamp(t.y, self.divisions[1]),
            clamp(t.z, self.divisions[2]),
        ]
    }

    fn bin_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + j * self.divisions[0] + k * self.divisions[0] * self.divisions[1]
    }

    /// Finds the cell containing `x` within squared tolerance `tol2`.
    ///
    /// Only the candidates of the query point's bin are evaluated, so the
    /// amortized cost per query is independent of the total cell count.
    #[must_use]
    pub fn find_cell(&self, x: DVec3, tol2: f64) -> Option<FoundCell> {
        let [i, j, k] = self.bin_coords(x);
        let candidates = &self.bins[self.bin_index(i, j, k)];
        for &cell_id in candidates {
            let cell: Cell = self.dataset.cell(cell_id as usize);
            let eval = cell.evaluate_position(x);
            if eval.inside && eval.dist2 <= tol2 {
                return Some(FoundCell {
                    cell_id: cell_id as usize,
                    pcoords: eval.pcoords,
                    weights: eval.weights,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellKind;
    use crate::unstructured::UnstructuredGrid;
    use fieldprobe_core::UVec3;

    fn hex_grid() -> UnstructuredGrid {
        // a 3x3x3-cell stack of box-shaped hexahedra as unstructured cells
        let dim = UVec3::splat(4);
        let mut points = Vec::new();
        for k in 0..dim.z {
            for j in 0..dim.y {
                for i in 0..dim.x {
                    points.push(DVec3::new(f64::from(i), f64::from(j), f64::from(k)));
                }
            }
        }
        let mut grid = UnstructuredGrid::new("hexes", points);
        let id = |i: u32, j: u32, k: u32| i + j * dim.x + k * dim.x * dim.y;
        for k in 0..dim.z - 1 {
            for j in 0..dim.y - 1 {
                for i in 0..dim.x - 1 {
                    grid.add_cell(
                        CellKind::Hexahedron,
                        &[
                            id(i, j, k),
                            id(i + 1, j, k),
                            id(i + 1, j + 1, k),
                            id(i, j + 1, k),
                            id(i, j, k + 1),
                            id(i + 1, j, k + 1),
                            id(i + 1, j + 1, k + 1),
                            id(i, j + 1, k + 1),
                        ],
                    )
                    .unwrap();
                }
            }
        }
        grid
    }

    #[test]
    fn test_locator_agrees_with_scan() {
        let grid = hex_grid();
        let locator = CellLocator::build(&grid);
        for p in [
            DVec3::new(0.5, 0.5, 0.5),
            DVec3::new(2.5, 1.5, 0.5),
            DVec3::new(2.9, 2.9, 2.9),
        ] {
            let a = locator.find_cell(p, 0.0).unwrap();
            let b = grid.find_cell(p, 0.0).unwrap();
            assert_eq!(a.cell_id, b.cell_id, "mismatch at {p:?}");
        }
    }

    #[test]
    fn test_locator_misses_outside() {
        let grid = hex_grid();
        let locator = CellLocator::build(&grid);
        assert!(locator.find_cell(DVec3::splat(-0.5), 0.0).is_none());
        assert!(locator.find_cell(DVec3::splat(99.0), 0.0).is_none());
    }
}
