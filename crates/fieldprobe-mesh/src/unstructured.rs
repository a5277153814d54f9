//! Unstructured grid: explicit points and mixed-kind connectivity.

use fieldprobe_core::{AttributeSet, FieldProbeError, Result};
use glam::DVec3;

use crate::cell::{Cell, CellKind};
use crate::dataset::Dataset;

/// A dataset with explicit point positions and per-cell connectivity.
///
/// Connectivity is stored flat with per-cell offsets, so mixed tetra/hex
/// meshes need no per-cell allocation.
pub struct UnstructuredGrid {
    name: String,
    points: Vec<DVec3>,
    kinds: Vec<CellKind>,
    offsets: Vec<usize>,
    connectivity: Vec<u32>,
    point_data: AttributeSet,
    cell_data: AttributeSet,
    field_data: AttributeSet,
    max_cell_size: usize,
}

impl UnstructuredGrid {
    /// Creates an empty grid over the given points.
    #[must_use]
    pub fn new(name: impl Into<String>, points: Vec<DVec3>) -> Self {
        Self {
            name: name.into(),
            points,
            kinds: Vec::new(),
            offsets: vec![0],
            connectivity: Vec::new(),
            point_data: AttributeSet::new(),
            cell_data: AttributeSet::new(),
            field_data: AttributeSet::new(),
            max_cell_size: 0,
        }
    }

    /// Appends a cell.
    ///
    /// # Errors
    /// Returns [`FieldProbeError::SizeMismatch`] when the vertex count does
    /// not match the kind or an id is out of range.
    pub fn add_cell(&mut self, kind: CellKind, vertex_ids: &[u32]) -> Result<()> {
        if vertex_ids.len() != kind.num_vertices() {
            return Err(FieldProbeError::SizeMismatch {
                expected: kind.num_vertices(),
                actual: vertex_ids.len(),
            });
        }
        if let Some(&bad) = vertex_ids.iter().find(|&&id| id as usize >= self.points.len()) {
            return Err(FieldProbeError::SizeMismatch {
                expected: self.points.len(),
                actual: bad as usize,
            });
        }
        self.kinds.push(kind);
        self.connectivity.extend_from_slice(vertex_ids);
        self.offsets.push(self.connectivity.len());
        self.max_cell_size = self.max_cell_size.max(vertex_ids.len());
        Ok(())
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

impl Dataset for UnstructuredGrid {
    fn name(&self) -> &str {
        &self.name
    }

    fn bounding_box(&self) -> (DVec3, DVec3) {
        let mut min = DVec3::INFINITY;
        let mut max = DVec3::NEG_INFINITY;
        for p in &self.points {
            min = min.min(*p);
            max = max.max(*p);
        }
        (min, max)
    }

    fn num_points(&self) -> usize {
        self.points.len()
    }

    fn num_cells(&self) -> usize {
        self.kinds.len()
    }

    fn point(&self, id: usize) -> DVec3 {
        self.points[id]
    }

    fn cell_kind(&self, id: usize) -> CellKind {
        self.kinds[id]
    }

    fn cell(&self, id: usize) -> Cell {
        let ids = &self.connectivity[self.offsets[id]..self.offsets[id + 1]];
        let pts = ids.iter().map(|&i| self.points[i as usize]).collect();
        Cell::new(self.kinds[id], ids.to_vec(), pts)
    }

    fn cell_into(&self, id: usize, out: &mut Cell) {
        let ids = &self.connectivity[self.offsets[id]..self.offsets[id + 1]];
        out.assign(self.kinds[id], ids, |i| self.points[i as usize]);
    }

    fn max_cell_size(&self) -> usize {
        self.max_cell_size
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldprobe_core::AttributeArray;

    fn two_tets() -> UnstructuredGrid {
        let mut grid = UnstructuredGrid::new(
            "tets",
            vec![
                DVec3::ZERO,
                DVec3::X,
                DVec3::Y,
                DVec3::Z,
                DVec3::new(1.0, 1.0, 1.0),
            ],
        );
        grid.add_cell(CellKind::Tetra, &[0, 1, 2, 3]).unwrap();
        grid.add_cell(CellKind::Tetra, &[1, 2, 3, 4]).unwrap();
        grid
    }

    #[test]
    fn test_cell_assembly() {
        let grid = two_tets();
        assert_eq!(grid.num_cells(), 2);
        assert_eq!(grid.max_cell_size(), 4);
        let cell = grid.cell(1);
        assert_eq!(cell.vertex_ids(), &[1, 2, 3, 4]);
        assert_eq!(cell.points()[3], DVec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_cell_into_reassembles_scratch() {
        let grid = two_tets();
        let mut scratch = grid.cell(0);
        grid.cell_into(1, &mut scratch);
        let fresh = grid.cell(1);
        assert_eq!(scratch.kind(), fresh.kind());
        assert_eq!(scratch.vertex_ids(), fresh.vertex_ids());
        assert_eq!(scratch.points(), fresh.points());
    }

    #[test]
    fn test_add_cell_validation() {
        let mut grid = two_tets();
        assert!(grid.add_cell(CellKind::Tetra, &[0, 1, 2]).is_err());
        assert!(grid.add_cell(CellKind::Tetra, &[0, 1, 2, 9]).is_err());
    }

    #[test]
    fn test_default_find_cell() {
        let mut grid = two_tets();
        grid.point_data_mut()
            .add_scalars(AttributeArray::from_values("v", 1, vec![0.0; 5]).unwrap())
            .unwrap();

        let hit = grid.find_cell(DVec3::new(0.1, 0.1, 0.1), 0.0).unwrap();
        assert_eq!(hit.cell_id, 0);
        let sum: f64 = hit.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);

        assert!(grid.find_cell(DVec3::new(5.0, 5.0, 5.0), 0.0).is_none());
    }
}
