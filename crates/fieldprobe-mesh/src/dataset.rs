//! Dataset abstraction consumed by the probing engine.

use fieldprobe_core::AttributeSet;
use glam::DVec3;

use crate::cell::{Cell, CellKind};

/// Result of a successful containing-cell query.
#[derive(Debug, Clone)]
pub struct FoundCell {
    /// Id of the containing cell.
    pub cell_id: usize,
    /// Parametric coordinates of the query point within that cell.
    pub pcoords: DVec3,
    /// Interpolation weights for the cell's vertices.
    pub weights: Vec<f64>,
}

/// A spatially indexed collection of cells with point- and cell-centered
/// attributes.
///
/// Datasets are borrowed read-only for the duration of a probing call; the
/// probing engine owns its output buffers exclusively.
pub trait Dataset: Sync {
    /// Returns the dataset name (used in diagnostics).
    fn name(&self) -> &str;

    /// Axis-aligned bounding box over all points.
    fn bounding_box(&self) -> (DVec3, DVec3);

    /// Number of points.
    fn num_points(&self) -> usize;

    /// Number of cells.
    fn num_cells(&self) -> usize;

    /// Position of point `id`.
    fn point(&self, id: usize) -> DVec3;

    /// Kind of cell `id`, without assembling it.
    fn cell_kind(&self, id: usize) -> CellKind;

    /// Assembles cell `id` with its vertex ids and positions.
    fn cell(&self, id: usize) -> Cell;

    /// Re-reads cell `id` into `out`, reusing its allocations.
    ///
    /// The default assembles a fresh cell; datasets with flat storage
    /// override this to write in place via [`Cell::assign`].
    fn cell_into(&self, id: usize, out: &mut Cell) {
        *out = self.cell(id);
    }

    /// Largest vertex count over all cells, for sizing weight buffers.
    fn max_cell_size(&self) -> usize;

    /// Point-centered attributes.
    fn point_data(&self) -> &AttributeSet;

    /// Cell-centered attributes.
    fn cell_data(&self) -> &AttributeSet;

    /// Dataset-global attributes, not tied to points or cells.
    fn field_data(&self) -> &AttributeSet;

    /// Finds the cell containing `x`, within squared tolerance `tol2`.
    ///
    /// The default is a bounded scan with per-cell bounding-box rejection;
    /// structured datasets override this with a closed form, and callers
    /// wanting indexed search wrap the dataset in a
    /// [`CellLocator`](crate::locator::CellLocator).
    fn find_cell(&self, x: DVec3, tol2: f64) -> Option<FoundCell> {
        let pad = tol2.sqrt();
        for cell_id in 0..self.num_cells() {
            let cell = self.cell(cell_id);
            let (min, max) = cell.bounding_box();
            if x.cmplt(min - DVec3::splat(pad)).any() || x.cmpgt(max + DVec3::splat(pad)).any() {
                continue;
            }
            let eval = cell.evaluate_position(x);
            if eval.inside && eval.dist2 <= tol2 {
                return Some(FoundCell {
                    cell_id,
                    pcoords: eval.pcoords,
                    weights: eval.weights,
                });
            }
        }
        None
    }
}

/// Returns true when two bounding boxes intersect.
#[must_use]
pub fn bounds_intersect(a: (DVec3, DVec3), b: (DVec3, DVec3)) -> bool {
    a.0.cmple(b.1).all() && b.0.cmple(a.1).all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_intersect() {
        let a = (DVec3::ZERO, DVec3::ONE);
        let b = (DVec3::splat(0.5), DVec3::splat(2.0));
        let c = (DVec3::splat(1.5), DVec3::splat(2.0));
        assert!(bounds_intersect(a, b));
        assert!(!bounds_intersect(a, c));
        assert!(bounds_intersect(b, c));
    }
}
