//! Velocity lookup over one or more datasets, with last-cell caching.

use fieldprobe_core::{FieldProbeError, Result};
use fieldprobe_mesh::{Dataset, FoundCell};
use glam::DVec3;

use crate::probe::CELL_TOLERANCE_FACTOR_SQR;

/// Evaluates a named 3-component point field anywhere inside a set of
/// datasets.
///
/// Consecutive queries along a streamline usually land in the same cell,
/// so the last containing cell is re-tested before falling back to a full
/// containment search. The cache must be cleared between seeds.
pub struct InterpolatedVelocityField<'a> {
    datasets: Vec<&'a dyn Dataset>,
    array_indices: Vec<usize>,
    tolerances: Vec<f64>,
    last_dataset: usize,
    last_cell: Option<FoundCell>,
    cache_hits: u64,
    cache_misses: u64,
}

impl std::fmt::Debug for InterpolatedVelocityField<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpolatedVelocityField")
            .field("array_indices", &self.array_indices)
            .field("tolerances", &self.tolerances)
            .field("last_dataset", &self.last_dataset)
            .field("last_cell", &self.last_cell)
            .field("cache_hits", &self.cache_hits)
            .field("cache_misses", &self.cache_misses)
            .finish_non_exhaustive()
    }
}


impl<'a> InterpolatedVelocityField<'a> {
    /// Binds `vector_name` on every dataset.
    ///
    /// Fails if any dataset lacks the array or carries it with a width
    /// other than 3.
    pub fn new(datasets: Vec<&'a dyn Dataset>, vector_name: &str) -> Result<Self> {
        let mut array_indices = Vec::with_capacity(datasets.len());
        let mut tolerances = Vec::with_capacity(datasets.len());
        for ds in &datasets {
            let Some(idx) = ds.point_data().position(vector_name) else {
                log::warn!("dataset '{}' lacks vector array '{vector_name}'", ds.name());
                return Err(FieldProbeError::NoVectors(vector_name.to_owned()));
            };
            let components = ds.point_data().arrays()[idx].components();
            if components != 3 {
                return Err(FieldProbeError::SizeMismatch {
                    expected: 3,
                    actual: components,
                });
            }
            array_indices.push(idx);
            tolerances.push(containment_tolerance(*ds));
        }
        Ok(Self {
            datasets,
            array_indices,
            tolerances,
            last_dataset: 0,
            last_cell: None,
            cache_hits: 0,
            cache_misses: 0,
        })
    }

    /// Interpolated velocity at `x`, or `None` outside every dataset.
    pub fn evaluate(&mut self, x: DVec3) -> Option<DVec3> {
        if let Some(found) = &self.last_cell {
            let ds = self.datasets[self.last_dataset];
            let cell = ds.cell(found.cell_id);
            let eval = cell.evaluate_position(x);
            if eval.inside {
                let v = interpolate_vector(
                    ds,
                    self.array_indices[self.last_dataset],
                    cell.vertex_ids(),
                    &eval.weights,
                );
                self.last_cell = Some(FoundCell {
                    cell_id: found.cell_id,
                    pcoords: eval.pcoords,
                    weights: eval.weights,
                });
                self.cache_hits += 1;
                return Some(v);
            }
        }

        self.cache_misses += 1;
        for (ds_idx, ds) in self.datasets.iter().enumerate() {
            let Some(found) = ds.find_cell(x, self.tolerances[ds_idx]) else {
                continue;
            };
            let cell = ds.cell(found.cell_id);
            let v = interpolate_vector(
                *ds,
                self.array_indices[ds_idx],
                cell.vertex_ids(),
                &found.weights,
            );
            self.last_dataset = ds_idx;
            self.last_cell = Some(found);
            return Some(v);
        }
        self.last_cell = None;
        None
    }

    /// Dataset and cell that answered the last successful query.
    #[must_use]
    pub fn last_cell(&self) -> Option<(&'a dyn Dataset, &FoundCell)> {
        self.last_cell
            .as_ref()
            .map(|fc| (self.datasets[self.last_dataset], fc))
    }

    /// The bound vector array on the dataset that answered the last
    /// successful query.
    #[must_use]
    pub fn last_vector_array(&self) -> Option<&'a fieldprobe_core::AttributeArray> {
        self.last_cell.as_ref().map(|_| {
            let ds = self.datasets[self.last_dataset];
            &ds.point_data().arrays()[self.array_indices[self.last_dataset]]
        })
    }

    /// Forgets the cached cell. Call between seeds.
    pub fn clear_cache(&mut self) {
        self.last_cell = None;
    }

    /// (hits, misses) counters over the field's lifetime.
    #[must_use]
    pub fn cache_stats(&self) -> (u64, u64) {
        (self.cache_hits, self.cache_misses)
    }
}

/// Squared containment tolerance derived from a dataset's leading cells.
fn containment_tolerance(ds: &dyn Dataset) -> f64 {
    let sample = ds.num_cells().min(20);
    let mut max_len2: f64 = 0.0;
    for cell_id in 0..sample {
        max_len2 = max_len2.max(ds.cell(cell_id).length_squared());
    }
    CELL_TOLERANCE_FACTOR_SQR * max_len2
}

fn interpolate_vector(
    ds: &dyn Dataset,
    array_idx: usize,
    vertex_ids: &[u32],
    weights: &[f64],
) -> DVec3 {
    let array = &ds.point_data().arrays()[array_idx];
    let mut v = DVec3::ZERO;
    for (&id, &w) in vertex_ids.iter().zip(weights) {
        let t = array.tuple(id as usize);
        v += w * DVec3::new(t[0], t[1], t[2]);
    }
    v
}
