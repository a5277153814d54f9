//! Inverted probing for regular-grid sample points.
//!
//! When the samples are the nodes of an [`ImageGrid`] the containment
//! search inverts: instead of locating the cell around each sample, iterate
//! the source cells and compute in closed form which grid nodes fall inside
//! each cell's bounding box. Only those nodes are evaluated against the
//! cell. Source cells are processed in parallel; each worker reuses a
//! per-kind cell scratch plus one weights buffer and collects hit records
//! that are then applied to the output sequentially in cell order, so
//! results are deterministic.

use fieldprobe_core::{FieldBinding, FieldList, FieldProbeError, ProbeOutput, Result};
use fieldprobe_mesh::{Cell, CellKind, Dataset, ImageGrid};
use rayon::prelude::*;

use super::{apply_point, pass_arrays, ProbeFilter, CELL_TOLERANCE_FACTOR_SQR};

/// One grid node claimed by a source cell.
struct GridHit {
    node_id: usize,
    weights: Vec<f64>,
}

/// Per-worker scratch reused across the source cells of a pass.
///
/// Each worker keeps one assembled cell per kind plus a single weights
/// buffer, so steady-state probing allocates only for actual hits.
struct WorkerScratch {
    cells: [Option<Cell>; CellKind::COUNT],
    weights: Vec<f64>,
}

impl WorkerScratch {
    fn new() -> Self {
        Self {
            cells: [None, None, None, None],
            weights: Vec::new(),
        }
    }

    /// Assembles `cell_id` into the slot cached for its kind, handing the
    /// cell back together with the weights buffer.
    fn read_cell<'s>(
        &'s mut self,
        source: &dyn Dataset,
        cell_id: usize,
    ) -> (&'s Cell, &'s mut Vec<f64>) {
        let slot = &mut self.cells[source.cell_kind(cell_id).index()];
        let cell = match slot.take() {
            Some(mut cell) => {
                source.cell_into(cell_id, &mut cell);
                slot.insert(cell)
            }
            None => slot.insert(source.cell(cell_id)),
        };
        (cell, &mut self.weights)
    }
}

/// Collects the grid nodes inside `cell`, within squared tolerance `tol2`.
fn hits_in_cell(
    grid: &ImageGrid,
    cell: &Cell,
    tol2: f64,
    weights: &mut Vec<f64>,
) -> Vec<GridHit> {
    let (min, max) = cell.bounding_box();
    let Some((i0, i1)) = grid.node_range_in_bounds(0, min.x, max.x) else {
        return Vec::new();
    };
    let Some((j0, j1)) = grid.node_range_in_bounds(1, min.y, max.y) else {
        return Vec::new();
    };
    let Some((k0, k1)) = grid.node_range_in_bounds(2, min.z, max.z) else {
        return Vec::new();
    };

    let mut hits = Vec::new();
    for k in k0..=k1 {
        for j in j0..=j1 {
            for i in i0..=i1 {
                let x = grid.position_of_node(i, j, k);
                let placement = cell.evaluate_position_into(x, weights);
                if placement.inside && placement.dist2 <= tol2 {
                    hits.push(GridHit {
                        node_id: grid.flatten_node_index(i, j, k),
                        weights: weights.clone(),
                    });
                }
            }
        }
    }
    hits
}

impl ProbeFilter {
    /// Probes `source` at every node of a regular sample grid.
    ///
    /// Semantically equivalent to [`ProbeFilter::probe`] over
    /// [`ImageGrid::node_positions`], but runs the inverted per-source-cell
    /// search, which skips the containment query entirely.
    pub fn probe_grid(&self, grid: &ImageGrid, source: &dyn Dataset) -> Result<ProbeOutput> {
        self.validate_categorical(source)?;
        let fields = FieldList::build(source.point_data(), source.cell_data());
        let mut output = fields.allocate_output(grid.num_points());
        self.probe_grid_into(grid, source, &fields, &mut output)?;
        if self.options.pass_field_arrays {
            pass_arrays(source.field_data(), output.field_data_mut());
        }
        Ok(output)
    }

    /// Runs one inverted probing pass of `source` over the grid nodes.
    ///
    /// Nodes claimed by a previous pass are skipped. Within the pass a node
    /// shared by several source cells is written by the highest cell id;
    /// for conforming meshes the candidates agree at shared boundaries.
    pub fn probe_grid_into(
        &self,
        grid: &ImageGrid,
        source: &dyn Dataset,
        fields: &FieldList,
        output: &mut ProbeOutput,
    ) -> Result<()> {
        if grid.num_points() != output.num_points() {
            return Err(FieldProbeError::SizeMismatch {
                expected: output.num_points(),
                actual: grid.num_points(),
            });
        }
        if source.num_cells() == 0 {
            return Err(FieldProbeError::EmptyDataset(source.name().to_owned()));
        }

        let binding = FieldBinding::resolve(
            fields,
            source.point_data(),
            source.cell_data(),
            output,
            self.options.categorical,
        );
        let fixed_tol2 = self.options.tolerance * self.options.tolerance;

        log::debug!(
            "grid-probing {} nodes against '{}' ({} cells)",
            grid.num_points(),
            source.name(),
            source.num_cells()
        );

        let per_cell: Vec<Vec<GridHit>> = (0..source.num_cells())
            .into_par_iter()
            .map_init(WorkerScratch::new, |scratch, cell_id| {
                if self.aborted() {
                    return Vec::new();
                }
                let (cell, weights) = scratch.read_cell(source, cell_id);
                let tol2 = if self.options.compute_tolerance {
                    CELL_TOLERANCE_FACTOR_SQR * cell.length_squared()
                } else {
                    fixed_tol2
                };
                hits_in_cell(grid, cell, tol2, weights)
            })
            .collect();

        if self.aborted() {
            log::info!("grid probe aborted, output left partial");
        }

        // Nodes claimed before this pass stay untouched (first block wins);
        // the snapshot keeps this pass's own writes from shadowing them.
        let claimed = output.mask().to_vec();
        let mut scratch = WorkerScratch::new();
        for (cell_id, hits) in per_cell.iter().enumerate() {
            if hits.is_empty() {
                continue;
            }
            let (cell, _) = scratch.read_cell(source, cell_id);
            for hit in hits {
                if claimed[hit.node_id] == 1 {
                    continue;
                }
                apply_point(
                    output,
                    source,
                    &binding,
                    hit.node_id,
                    cell_id,
                    cell.vertex_ids(),
                    &hit.weights,
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldprobe_core::AttributeArray;
    use fieldprobe_mesh::UnstructuredGrid;
    use glam::{DVec3, UVec3};

    /// Source grid over [0,2]^3 with f = x and a categorical zone label.
    fn source_grid() -> ImageGrid {
        let mut grid = ImageGrid::new("source", UVec3::splat(3), DVec3::ZERO, DVec3::ONE);
        let f: Vec<f64> = grid.node_positions().iter().map(|p| p.x).collect();
        let zone: Vec<f64> = grid
            .node_positions()
            .iter()
            .map(|p| if p.x < 1.0 { 3.0 } else { 5.0 })
            .collect();
        grid.point_data_mut()
            .add_array(AttributeArray::from_values("f", 1, f).unwrap())
            .unwrap();
        grid.point_data_mut()
            .add_scalars(AttributeArray::from_values("zone", 1, zone).unwrap())
            .unwrap();
        grid
    }

    #[test]
    fn test_grid_path_matches_point_path() {
        let source = source_grid();
        let samples = ImageGrid::new(
            "samples",
            UVec3::splat(5),
            DVec3::splat(0.1),
            DVec3::splat(0.45),
        );
        let filter = ProbeFilter::new();

        let inverted = filter.probe_grid(&samples, &source).unwrap();
        let pointwise = filter.probe(&samples.node_positions(), &source).unwrap();

        assert_eq!(inverted.mask(), pointwise.mask());
        let a = inverted.point_data().array("f").unwrap();
        let b = pointwise.point_data().array("f").unwrap();
        for (x, y) in a.values().iter().zip(b.values()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    /// One hexahedron with a tetra capping its top face, f = x + 2y + 3z.
    fn mixed_kind_source() -> UnstructuredGrid {
        let points = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(1.0, 0.0, 1.0),
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(0.0, 1.0, 1.0),
            DVec3::new(0.5, 0.5, 2.0),
        ];
        let f: Vec<f64> = points.iter().map(|p| p.x + 2.0 * p.y + 3.0 * p.z).collect();
        let mut grid = UnstructuredGrid::new("mixed", points);
        grid.add_cell(CellKind::Hexahedron, &[0, 1, 2, 3, 4, 5, 6, 7])
            .unwrap();
        grid.add_cell(CellKind::Tetra, &[4, 5, 7, 8]).unwrap();
        grid.point_data_mut()
            .add_array(AttributeArray::from_values("f", 1, f).unwrap())
            .unwrap();
        grid
    }

    #[test]
    fn test_mixed_kind_source_matches_point_path() {
        let source = mixed_kind_source();
        // z = 1.1 nodes land in the tetra, the rest in the hexahedron
        let samples = ImageGrid::new(
            "samples",
            UVec3::new(2, 2, 3),
            DVec3::new(0.35, 0.35, 0.2),
            DVec3::new(0.1, 0.1, 0.45),
        );
        let filter = ProbeFilter::new();

        let inverted = filter.probe_grid(&samples, &source).unwrap();
        let pointwise = filter.probe(&samples.node_positions(), &source).unwrap();

        assert_eq!(inverted.mask(), pointwise.mask());
        assert!(inverted.mask().iter().all(|&m| m == 1));
        let a = inverted.point_data().array("f").unwrap();
        let b = pointwise.point_data().array("f").unwrap();
        for (x, y) in a.values().iter().zip(b.values()) {
            assert!((x - y).abs() < 1e-12);
        }
        for (id, p) in samples.node_positions().iter().enumerate() {
            let expected = p.x + 2.0 * p.y + 3.0 * p.z;
            assert!((a.tuple(id)[0] - expected).abs() < 1e-6, "node {id} at {p}");
        }
    }

    #[test]
    fn test_nodes_outside_source_stay_masked_out() {
        let source = source_grid();
        // samples span [-2,4]: outer nodes fall outside the source
        let samples = ImageGrid::new(
            "samples",
            UVec3::splat(4),
            DVec3::splat(-2.0),
            DVec3::splat(2.0),
        );
        let out = ProbeFilter::new().probe_grid(&samples, &source).unwrap();
        let masked: usize = out.mask().iter().map(|&m| usize::from(m)).sum();
        assert!(masked > 0);
        assert!(masked < samples.num_points());
        let positions = samples.node_positions();
        for (id, &m) in out.mask().iter().enumerate() {
            let p = positions[id];
            let inside =
                p.cmpge(DVec3::ZERO).all() && p.cmple(DVec3::splat(2.0)).all();
            assert_eq!(m == 1, inside, "node {id} at {p}");
        }
    }

    #[test]
    fn test_categorical_labels_never_blend() {
        let source = source_grid();
        let samples = ImageGrid::new(
            "samples",
            UVec3::new(2, 1, 1),
            DVec3::new(0.9, 0.5, 0.5),
            DVec3::splat(0.001),
        );
        let mut filter = ProbeFilter::new();
        filter.options_mut().categorical = true;
        let out = filter.probe_grid(&samples, &source).unwrap();
        let zone = out.point_data().array("zone").unwrap();
        for id in 0..out.num_points() {
            let v = zone.tuple(id)[0];
            assert!(v == 3.0 || v == 5.0, "blended label {v}");
        }
        // interpolated f still blends
        let f = out.point_data().array("f").unwrap();
        assert!((f.tuple(0)[0] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_pass_keeps_first_result() {
        let source = source_grid();
        let samples = ImageGrid::new(
            "samples",
            UVec3::splat(3),
            DVec3::splat(0.25),
            DVec3::splat(0.5),
        );
        let filter = ProbeFilter::new();
        let fields = FieldList::build(source.point_data(), source.cell_data());
        let mut output = fields.allocate_output(samples.num_points());
        filter
            .probe_grid_into(&samples, &source, &fields, &mut output)
            .unwrap();
        let first = output.point_data().array("f").unwrap().values().to_vec();
        filter
            .probe_grid_into(&samples, &source, &fields, &mut output)
            .unwrap();
        assert_eq!(
            output.point_data().array("f").unwrap().values(),
            &first[..]
        );
    }
}
