//! Image grid: a regular, axis-aligned, uniformly spaced dataset.
//!
//! Node positions, cell assembly, and the containing-cell query are all
//! closed-form arithmetic; no search structure is ever needed. An
//! `ImageGrid` serves both as a probing source and as the structured
//! sample-point set driving the inverted per-source-cell probing path.

use fieldprobe_core::{AttributeSet, UVec3};
use glam::DVec3;

use crate::cell::{Cell, CellKind};
use crate::dataset::{Dataset, FoundCell};

/// A regular 3D grid defined by origin, spacing, and node dimensions.
pub struct ImageGrid {
    name: String,
    origin: DVec3,
    spacing: DVec3,
    node_dim: UVec3,
    point_data: AttributeSet,
    cell_data: AttributeSet,
    field_data: AttributeSet,
}

impl ImageGrid {
    /// Creates a grid with `node_dim` nodes per axis.
    ///
    /// # Panics
    /// Panics if any dimension is zero or any spacing is non-positive.
    #[must_use]
    pub fn new(name: impl Into<String>, node_dim: UVec3, origin: DVec3, spacing: DVec3) -> Self {
        assert!(node_dim.min_element() >= 1, "node dimensions must be >= 1");
        assert!(spacing.min_element() > 0.0, "spacing must be positive");
        Self {
            name: name.into(),
            origin,
            spacing,
            node_dim,
            point_data: AttributeSet::new(),
            cell_data: AttributeSet::new(),
            field_data: AttributeSet::new(),
        }
    }

    /// Grid origin (position of node (0, 0, 0)).
    #[must_use]
    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    /// Node spacing per axis.
    #[must_use]
    pub fn spacing(&self) -> DVec3 {
        self.spacing
    }

    /// Number of nodes per axis.
    #[must_use]
    pub fn node_dim(&self) -> UVec3 {
        self.node_dim
    }

    /// Number of cells per axis.
    #[must_use]
    pub fn cell_dim(&self) -> UVec3 {
        self.node_dim.saturating_sub(UVec3::ONE)
    }

    /// Flattens a 3D node index to a linear index (x fastest).
    #[must_use]
    pub fn flatten_node_index(&self, i: u32, j: u32, k: u32) -> usize {
        (i as usize)
            + (j as usize) * (self.node_dim.x as usize)
            + (k as usize) * (self.node_dim.x as usize) * (self.node_dim.y as usize)
    }

    /// Unflattens a linear node index to a 3D index.
    #[must_use]
    pub fn unflatten_node_index(&self, idx: usize) -> UVec3 {
        let nx = self.node_dim.x as usize;
        let ny = self.node_dim.y as usize;
        UVec3::new(
            (idx % nx) as u32,
            ((idx / nx) % ny) as u32,
            (idx / (nx * ny)) as u32,
        )
    }

    /// World position of the node at the given 3D index.
    #[must_use]
    pub fn position_of_node(&self, i: u32, j: u32, k: u32) -> DVec3 {
        self.origin + DVec3::new(f64::from(i), f64::from(j), f64::from(k)) * self.spacing
    }

    /// Node positions in linear order, for use as probe sample points.
    #[must_use]
    pub fn node_positions(&self) -> Vec<DVec3> {
        (0..self.num_points())
            .map(|idx| {
                let ijk = self.unflatten_node_index(idx);
                self.position_of_node(ijk.x, ijk.y, ijk.z)
            })
            .collect()
    }

    /// Node-index range per axis whose physical coordinates fall within
    /// `[range_min, range_max]`; `None` when the range misses the grid.
    ///
    /// `idx = ceil((bound - origin) / spacing)` clamped to the extent, the
    /// arithmetic heart of the inverted regular-grid probing path.
    #[must_use]
    pub fn node_range_in_bounds(&self, axis: usize, range_min: f64, range_max: f64) -> Option<(u32, u32)> {
        let start = self.origin[axis];
        let step = self.spacing[axis];
        let num = i64::from(self.node_dim[axis]);

        let min_id = (((range_min - start) / step).ceil() as i64).max(0);
        let max_id = (((range_max - start) / step).floor() as i64).min(num - 1);
        #[allow(clippy::cast_sign_loss)]
        (min_id <= max_id).then_some((min_id as u32, max_id as u32))
    }

    /// Global node ids of the 8 corners of cell `id`, voxel-ordered.
    fn cell_node_ids(&self, id: usize) -> [u32; 8] {
        let cd = self.cell_dim();
        let cx = cd.x as usize;
        let cy = cd.y as usize;
        let ci = (id % cx) as u32;
        let cj = ((id / cx) % cy) as u32;
        let ck = (id / (cx * cy)) as u32;

        let mut ids = [0_u32; 8];
        let mut n = 0;
        for dk in 0..2 {
            for dj in 0..2 {
                for di in 0..2 {
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        ids[n] = self.flatten_node_index(ci + di, cj + dj, ck + dk) as u32;
                    }
                    n += 1;
                }
            }
        }
        ids
    }

    /// Point-centered attributes, mutably.
    pub fn point_data_mut(&mut self) -> &mut AttributeSet {
        &mut self.point_data
    }

    /// Cell-centered attributes, mutably.
    pub fn cell_data_mut(&mut self) -> &mut AttributeSet {
        &mut self.cell_data
    }

    /// Mutable access to the dataset-global attributes.
    pub fn field_data_mut(&mut self) -> &mut AttributeSet {
        &mut self.field_data
    }
}

impl Dataset for ImageGrid {
    fn name(&self) -> &str {
        &self.name
    }

    fn bounding_box(&self) -> (DVec3, DVec3) {
        let cd = self.cell_dim();
        let ext = DVec3::new(f64::from(cd.x), f64::from(cd.y), f64::from(cd.z)) * self.spacing;
        (self.origin, self.origin + ext)
    }

    fn num_points(&self) -> usize {
        (self.node_dim.x as usize) * (self.node_dim.y as usize) * (self.node_dim.z as usize)
    }

    fn num_cells(&self) -> usize {
        let cd = self.cell_dim();
        (cd.x as usize) * (cd.y as usize) * (cd.z as usize)
    }

    fn point(&self, id: usize) -> DVec3 {
        let ijk = self.unflatten_node_index(id);
        self.position_of_node(ijk.x, ijk.y, ijk.z)
    }

    fn cell_kind(&self, _id: usize) -> CellKind {
        CellKind::Voxel
    }

    fn cell(&self, id: usize) -> Cell {
        let ids = self.cell_node_ids(id);
        let pts = ids.iter().map(|&v| self.point(v as usize)).collect();
        Cell::new(CellKind::Voxel, ids.to_vec(), pts)
    }

    fn cell_into(&self, id: usize, out: &mut Cell) {
        let ids = self.cell_node_ids(id);
        out.assign(CellKind::Voxel, &ids, |v| self.point(v as usize));
    }

    fn max_cell_size(&self) -> usize {
        8
    }

    fn point_data(&self) -> &AttributeSet {
        &self.point_data
    }

    fn cell_data(&self) -> &AttributeSet {
        &self.cell_data
    }

    fn field_data(&self) -> &AttributeSet {
        &self.field_data
    }

    fn find_cell(&self, x: DVec3, tol2: f64) -> Option<FoundCell> {
        let (min, max) = self.bounding_box();
        let pad = tol2.sqrt();
        if x.cmplt(min - DVec3::splat(pad)).any() || x.cmpgt(max + DVec3::splat(pad)).any() {
            return None;
        }
        let cd = self.cell_dim();
        if cd.min_element() == 0 {
            return None;
        }

        let t = (x - self.origin) / self.spacing;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = |v: f64, n: u32| -> u32 { (v.floor().max(0.0) as u32).min(n - 1) };
        let (ci, cj, ck) = (idx(t.x, cd.x), idx(t.y, cd.y), idx(t.z, cd.z));
        let cell_id =
            (ci as usize) + (cj as usize) * (cd.x as usize) + (ck as usize) * (cd.x as usize) * (cd.y as usize);

        let cell = self.cell(cell_id);
        let eval = cell.evaluate_position(x);
        (eval.inside || eval.dist2 <= tol2).then_some(FoundCell {
            cell_id,
            pcoords: eval.pcoords,
            weights: eval.weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ImageGrid {
        // covers [-10, 10]^3 at unit spacing
        ImageGrid::new(
            "uniform",
            UVec3::splat(21),
            DVec3::splat(-10.0),
            DVec3::ONE,
        )
    }

    #[test]
    fn test_dims_and_bounds() {
        let g = grid();
        assert_eq!(g.num_points(), 21 * 21 * 21);
        assert_eq!(g.num_cells(), 20 * 20 * 20);
        let (min, max) = g.bounding_box();
        assert_eq!(min, DVec3::splat(-10.0));
        assert_eq!(max, DVec3::splat(10.0));
    }

    #[test]
    fn test_index_roundtrip() {
        let g = grid();
        let idx = g.flatten_node_index(3, 7, 11);
        assert_eq!(g.unflatten_node_index(idx), UVec3::new(3, 7, 11));
    }

    #[test]
    fn test_cell_into_reassembles_scratch() {
        let g = grid();
        let mut scratch = g.cell(0);
        let last = g.num_cells() - 1;
        g.cell_into(last, &mut scratch);
        let fresh = g.cell(last);
        assert_eq!(scratch.vertex_ids(), fresh.vertex_ids());
        assert_eq!(scratch.points(), fresh.points());
    }

    #[test]
    fn test_find_cell_closed_form() {
        let g = grid();
        let hit = g.find_cell(DVec3::new(0.5, 0.5, 0.5), 0.0).unwrap();
        let cell = g.cell(hit.cell_id);
        let (min, max) = cell.bounding_box();
        assert!(min.cmple(DVec3::splat(0.5)).all());
        assert!(max.cmpge(DVec3::splat(0.5)).all());
        let sum: f64 = hit.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);

        assert!(g.find_cell(DVec3::splat(11.0), 0.0).is_none());
    }

    #[test]
    fn test_find_cell_top_boundary() {
        // the far corner belongs to the last cell, not a phantom one
        let g = grid();
        let hit = g.find_cell(DVec3::splat(10.0), 0.0).unwrap();
        assert_eq!(hit.cell_id, g.num_cells() - 1);
    }

    #[test]
    fn test_node_range_in_bounds() {
        let g = grid();
        // bbox [0.2, 2.7] covers nodes at 1.0 and 2.0 -> indices 11..=12
        assert_eq!(g.node_range_in_bounds(0, 0.2, 2.7), Some((11, 12)));
        // degenerate range between two nodes
        assert_eq!(g.node_range_in_bounds(0, 0.1, 0.9), None);
        // clamped at the extent
        assert_eq!(g.node_range_in_bounds(0, 9.5, 99.0), Some((20, 20)));
    }
}
