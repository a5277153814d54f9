//! Point-wise probing of a source dataset at arbitrary sample locations.
//!
//! The probe takes a set of sample points and a source dataset, finds the
//! source cell containing each sample, and interpolates the source's
//! point-centered attributes (and copies its cell-centered ones) onto the
//! samples. Samples outside every source cell keep zeroed attributes and a
//! zero entry in the [`fieldprobe_core::VALID_POINT_MASK_NAME`] mask.

mod grid;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fieldprobe_core::{
    one_hot_weights, FieldBinding, FieldList, FieldProbeError, ProbeOptions, ProbeOutput, Result,
};
use fieldprobe_mesh::{CellLocator, Dataset, FoundCell};
use glam::DVec3;

/// Squared-distance rejection factor applied relative to a cell's own
/// squared diagonal length.
pub const CELL_TOLERANCE_FACTOR_SQR: f64 = 1e-6;

/// How many leading cells are measured when deriving the search tolerance.
const TOLERANCE_CELL_SAMPLE: usize = 20;

/// How the probe locates the cell containing each sample point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStrategy {
    /// Use the dataset's own `find_cell`. Closed form for regular grids,
    /// a bounded scan for unstructured ones.
    #[default]
    DatasetDefault,
    /// Build a uniform-bin cell locator over the source and query it.
    Locator,
}

enum Searcher<'a> {
    Dataset(&'a dyn Dataset),
    Locator(CellLocator<'a, dyn Dataset + 'a>),
}

impl Searcher<'_> {
    fn find_cell(&self, x: DVec3, tol2: f64) -> Option<FoundCell> {
        match self {
            Searcher::Dataset(ds) => ds.find_cell(x, tol2),
            Searcher::Locator(loc) => loc.find_cell(x, tol2),
        }
    }
}

/// Probes a source dataset at arbitrary sample locations.
///
/// ```no_run
/// use fieldprobe::probe::ProbeFilter;
/// # fn demo(source: &dyn fieldprobe_mesh::Dataset) -> fieldprobe_core::Result<()> {
/// let filter = ProbeFilter::new();
/// let samples = vec![glam::DVec3::ZERO, glam::DVec3::ONE];
/// let output = filter.probe(&samples, source)?;
/// assert_eq!(output.num_points(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ProbeFilter {
    options: ProbeOptions,
    strategy: SearchStrategy,
    abort: Option<Arc<AtomicBool>>,
}

impl ProbeFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_options(options: ProbeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ProbeOptions {
        &mut self.options
    }

    /// Selects the containing-cell search strategy.
    pub fn set_strategy(&mut self, strategy: SearchStrategy) {
        self.strategy = strategy;
    }

    /// Installs a cooperative cancellation flag, polled at progress
    /// checkpoints. A cancelled run returns the partial output.
    pub fn set_abort_flag(&mut self, flag: Arc<AtomicBool>) {
        self.abort = Some(flag);
    }

    fn aborted(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Squared search tolerance for one source dataset.
    ///
    /// When `compute_tolerance` is set this is derived from the source
    /// itself: the tolerance factor times the largest squared cell
    /// diagonal among the leading cells. Otherwise the configured
    /// tolerance is squared and used as-is.
    #[must_use]
    pub fn tolerance_squared(&self, source: &dyn Dataset) -> f64 {
        if !self.options.compute_tolerance {
            return self.options.tolerance * self.options.tolerance;
        }
        let sample = source.num_cells().min(TOLERANCE_CELL_SAMPLE);
        let mut max_len2: f64 = 0.0;
        for cell_id in 0..sample {
            max_len2 = max_len2.max(source.cell(cell_id).length_squared());
        }
        CELL_TOLERANCE_FACTOR_SQR * max_len2
    }

    fn validate_categorical(&self, source: &dyn Dataset) -> Result<()> {
        if !self.options.categorical {
            return Ok(());
        }
        let scalars = source
            .point_data()
            .scalars()
            .ok_or(FieldProbeError::NoScalars)?;
        if scalars.components() != 1 {
            return Err(FieldProbeError::NonScalarCategories {
                components: scalars.components(),
            });
        }
        Ok(())
    }

    /// Probes `source` at every position in `samples`.
    ///
    /// Allocates a fresh output sized to the samples, with one zeroed
    /// array per source attribute plus the validity mask, then runs a
    /// single probing pass.
    pub fn probe(&self, samples: &[DVec3], source: &dyn Dataset) -> Result<ProbeOutput> {
        self.validate_categorical(source)?;
        let fields = FieldList::build(source.point_data(), source.cell_data());
        let mut output = fields.allocate_output(samples.len());
        self.probe_into(samples, source, &fields, &mut output)?;
        if self.options.pass_field_arrays {
            pass_arrays(source.field_data(), output.field_data_mut());
        }
        Ok(output)
    }

    /// Probes every block of a composite source into one output.
    ///
    /// The output layout is the union of all blocks' attributes; blocks
    /// are probed in order and a sample claimed by an earlier block is
    /// never overwritten by a later one.
    pub fn probe_blocks(
        &self,
        samples: &[DVec3],
        sources: &[&dyn Dataset],
    ) -> Result<ProbeOutput> {
        let mut fields = FieldList::new();
        for source in sources {
            self.validate_categorical(*source)?;
            fields.union(source.point_data(), source.cell_data());
        }
        let mut output = fields.allocate_output(samples.len());
        for source in sources {
            self.probe_into(samples, *source, &fields, &mut output)?;
            if self.aborted() {
                break;
            }
        }
        if self.options.pass_field_arrays {
            if let Some(first) = sources.first() {
                pass_arrays(first.field_data(), output.field_data_mut());
            }
        }
        Ok(output)
    }

    /// Runs one probing pass of `source` over `samples` into an existing
    /// output.
    ///
    /// Samples already claimed by a previous pass (mask set) are skipped,
    /// giving first-block-wins semantics across passes.
    pub fn probe_into(
        &self,
        samples: &[DVec3],
        source: &dyn Dataset,
        fields: &FieldList,
        output: &mut ProbeOutput,
    ) -> Result<()> {
        if samples.len() != output.num_points() {
            return Err(FieldProbeError::SizeMismatch {
                expected: output.num_points(),
                actual: samples.len(),
            });
        }
        if source.num_cells() == 0 {
            return Err(FieldProbeError::EmptyDataset(source.name().to_owned()));
        }

        let binding =
            FieldBinding::resolve(fields, source.point_data(), source.cell_data(), output, self.options.categorical);
        let tol2 = self.tolerance_squared(source);
        let searcher = match self.strategy {
            SearchStrategy::DatasetDefault => Searcher::Dataset(source),
            SearchStrategy::Locator => Searcher::Locator(CellLocator::build(source)),
        };

        log::debug!(
            "probing {} samples against '{}' ({} cells, tol2 {:.3e})",
            samples.len(),
            source.name(),
            source.num_cells(),
            tol2
        );

        // Checkpoint granularity for progress logging and abort polling.
        let checkpoint = samples.len() / 20 + 1;

        for (pt_id, &x) in samples.iter().enumerate() {
            if pt_id % checkpoint == 0 {
                log::trace!("probe progress {}/{}", pt_id, samples.len());
                if self.aborted() {
                    log::info!("probe aborted at sample {pt_id}");
                    return Ok(());
                }
            }
            if output.mask()[pt_id] == 1 {
                continue;
            }
            let Some(found) = searcher.find_cell(x, tol2) else {
                continue;
            };

            let cell = source.cell(found.cell_id);
            let weights = if self.options.compute_tolerance {
                // The coarse search used a global tolerance; re-test the
                // candidate against its own size so one huge cell cannot
                // inflate the acceptance radius of every small one.
                let eval = cell.evaluate_position(x);
                if eval.dist2 > CELL_TOLERANCE_FACTOR_SQR * cell.length_squared() {
                    continue;
                }
                eval.weights
            } else {
                found.weights
            };

            apply_point(output, source, &binding, pt_id, found.cell_id, cell.vertex_ids(), &weights);
        }
        Ok(())
    }

    /// Probes `source` at the sample dataset's own points, carrying the
    /// sample geometry's attributes through per the pass flags.
    pub fn probe_dataset(
        &self,
        input: &dyn Dataset,
        source: &dyn Dataset,
    ) -> Result<ProbeOutput> {
        let samples: Vec<DVec3> = (0..input.num_points()).map(|i| input.point(i)).collect();
        let mut output = self.probe(&samples, source)?;
        if self.options.pass_point_arrays {
            pass_arrays(input.point_data(), output.point_data_mut());
        }
        if self.options.pass_cell_arrays {
            pass_arrays(input.cell_data(), output.cell_data_mut());
        }
        if self.options.pass_field_arrays {
            pass_arrays(input.field_data(), output.field_data_mut());
        }
        Ok(output)
    }
}

/// Writes one probed sample into the output and marks it valid.
fn apply_point(
    output: &mut ProbeOutput,
    source: &dyn Dataset,
    binding: &FieldBinding,
    pt_id: usize,
    cell_id: usize,
    vertex_ids: &[u32],
    weights: &[f64],
) {
    let (mask, point_data) = output.split_mut();
    let src_points = source.point_data().arrays();
    let src_cells = source.cell_data().arrays();

    for (pair_idx, &(si, di)) in binding.point_pairs.iter().enumerate() {
        if binding.categorical_pair == Some(pair_idx) {
            let snapped = one_hot_weights(weights);
            point_data.arrays_mut()[di].interpolate_tuple(pt_id, &src_points[si], vertex_ids, &snapped);
        } else {
            point_data.arrays_mut()[di].interpolate_tuple(pt_id, &src_points[si], vertex_ids, weights);
        }
    }
    for &(si, di) in &binding.cell_pairs {
        point_data.arrays_mut()[di].copy_tuple(pt_id, &src_cells[si], cell_id);
    }
    mask[pt_id] = 1;
}

/// Copies every array of `src` into `dst`, skipping name collisions.
fn pass_arrays(src: &fieldprobe_core::AttributeSet, dst: &mut fieldprobe_core::AttributeSet) {
    for array in src.arrays() {
        if dst.has_array(array.name()) {
            continue;
        }
        // add_array only fails on duplicates, which has_array rules out
        let _ = dst.add_array(array.clone());
    }
}
