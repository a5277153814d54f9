//! Field list: the precomputed source-to-output array mapping.
//!
//! Probing writes one output tuple per sample point for every mapped source
//! array. The mapping from source array identity (name + component count) to
//! output slot is computed once per source dataset, so the per-point inner
//! loop performs no name lookups. It must be rebuilt whenever the source's
//! attribute collections gain or lose arrays.

use crate::array::AttributeArray;
use crate::attributes::AttributeSet;

/// Name given to the validity mask array on the probe output.
pub const VALID_POINT_MASK_NAME: &str = "ValidPointMask";

/// One mapped array: identity of a source array and its output slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    /// Source (and output) array name.
    pub name: String,
    /// Component count; arrays map only when both name and width agree.
    pub components: usize,
}

/// Injective mapping from source arrays to output array slots.
///
/// Point-centered arrays are interpolated; cell-centered arrays are copied
/// from the winning cell. A cell array whose name collides with a point
/// array is skipped entirely (point data wins), so every output slot has
/// exactly one producer.
#[derive(Debug, Clone, Default)]
pub struct FieldList {
    point_slots: Vec<FieldSlot>,
    cell_slots: Vec<FieldSlot>,
}

impl FieldList {
    /// Creates an empty mapping; grow it with [`FieldList::union`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the mapping from a single source's attribute sets.
    #[must_use]
    pub fn build(point_attrs: &AttributeSet, cell_attrs: &AttributeSet) -> Self {
        let mut list = Self::new();
        list.union(point_attrs, cell_attrs);
        list
    }

    /// Merges another source block's attribute sets into the mapping.
    ///
    /// The first block to contribute a name fixes its slot; a later block's
    /// array of the same name but different width stays unmapped for that
    /// block (it is skipped at binding time). A point array evicts any
    /// previously merged cell slot of the same name.
    pub fn union(&mut self, point_attrs: &AttributeSet, cell_attrs: &AttributeSet) {
        for a in point_attrs.arrays() {
            if self.point_slots.iter().any(|s| s.name == a.name()) {
                continue;
            }
            self.cell_slots.retain(|s| s.name != a.name());
            self.point_slots.push(FieldSlot {
                name: a.name().to_string(),
                components: a.components(),
            });
        }
        for a in cell_attrs.arrays() {
            // Point data wins name collisions; a colliding cell array
            // would otherwise claim the same destination slot.
            if self.point_slots.iter().any(|s| s.name == a.name())
                || self.cell_slots.iter().any(|s| s.name == a.name())
                || a.name() == VALID_POINT_MASK_NAME
            {
                continue;
            }
            self.cell_slots.push(FieldSlot {
                name: a.name().to_string(),
                components: a.components(),
            });
        }
    }

    /// Mapped point-centered slots.
    #[must_use]
    pub fn point_slots(&self) -> &[FieldSlot] {
        &self.point_slots
    }

    /// Mapped cell-centered slots.
    #[must_use]
    pub fn cell_slots(&self) -> &[FieldSlot] {
        &self.cell_slots
    }

    /// Allocates the probe output for `num_points` sample points.
    ///
    /// Every mapped slot gets a zero-filled output array; the mask starts
    /// all-zero (no point probed yet).
    #[must_use]
    pub fn allocate_output(&self, num_points: usize) -> ProbeOutput {
        let mut point_data = AttributeSet::new();
        for slot in self.point_slots.iter().chain(&self.cell_slots) {
            // Slot names are unique by construction, so add cannot fail.
            let _ = point_data.add_array(AttributeArray::zeroed(
                slot.name.clone(),
                slot.components,
                num_points,
            ));
        }
        ProbeOutput {
            point_data,
            cell_data: AttributeSet::new(),
            field_data: AttributeSet::new(),
            mask: vec![0; num_points],
        }
    }
}

/// The result of a probing pass: one interpolated tuple per sample point
/// for every mapped array, plus the validity mask.
///
/// `mask[i] == 1` iff an enclosing source cell was found for sample `i`
/// within tolerance; output tuples are meaningful only where the mask is
/// set and stay zero elsewhere.
#[derive(Debug, Clone)]
pub struct ProbeOutput {
    point_data: AttributeSet,
    cell_data: AttributeSet,
    field_data: AttributeSet,
    mask: Vec<u8>,
}

impl ProbeOutput {
    /// Returns the interpolated output arrays.
    #[must_use]
    pub fn point_data(&self) -> &AttributeSet {
        &self.point_data
    }

    /// Returns the output arrays mutably.
    pub fn point_data_mut(&mut self) -> &mut AttributeSet {
        &mut self.point_data
    }

    /// Returns cell arrays carried over from the sampled geometry.
    #[must_use]
    pub fn cell_data(&self) -> &AttributeSet {
        &self.cell_data
    }

    /// Returns the carried-over cell arrays mutably.
    pub fn cell_data_mut(&mut self) -> &mut AttributeSet {
        &mut self.cell_data
    }

    /// Returns dataset-global arrays carried over from the sampled geometry.
    #[must_use]
    pub fn field_data(&self) -> &AttributeSet {
        &self.field_data
    }

    /// Returns the carried-over global arrays mutably.
    pub fn field_data_mut(&mut self) -> &mut AttributeSet {
        &mut self.field_data
    }

    /// Returns the validity mask, one byte per sample point.
    #[must_use]
    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    /// Returns the validity mask mutably.
    pub fn mask_mut(&mut self) -> &mut [u8] {
        &mut self.mask
    }

    /// Splits the output into mask and arrays for simultaneous mutation.
    pub fn split_mut(&mut self) -> (&mut [u8], &mut AttributeSet) {
        (&mut self.mask, &mut self.point_data)
    }

    /// Returns the number of sample points.
    #[must_use]
    pub fn num_points(&self) -> usize {
        self.mask.len()
    }

    /// Returns the indices of all successfully probed sample points.
    #[must_use]
    pub fn valid_points(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| (m == 1).then_some(i))
            .collect()
    }
}

/// Index-resolved binding of a [`FieldList`] against one concrete source.
///
/// Built once per (field list, source block) pair; the probing inner loop
/// then moves data purely by array index.
#[derive(Debug, Clone)]
pub struct FieldBinding {
    /// (source point-array index, output array index) pairs.
    pub point_pairs: Vec<(usize, usize)>,
    /// (source cell-array index, output array index) pairs.
    pub cell_pairs: Vec<(usize, usize)>,
    /// Index into `point_pairs` of the categorical scalar array, if any.
    pub categorical_pair: Option<usize>,
}

impl FieldBinding {
    /// Resolves `fields` against a source's attribute sets and the output.
    ///
    /// Arrays missing from this source block (multi-block probing with
    /// heterogeneous blocks) or with a mismatched width are left unbound;
    /// the corresponding output slots are simply not written by this pass.
    #[must_use]
    pub fn resolve(
        fields: &FieldList,
        source_points: &AttributeSet,
        source_cells: &AttributeSet,
        output: &ProbeOutput,
        categorical: bool,
    ) -> Self {
        let mut point_pairs = Vec::with_capacity(fields.point_slots().len());
        let mut categorical_pair = None;
        let scalars_name = source_points.scalars_name();

        for slot in fields.point_slots() {
            let (Some(si), Some(di)) = (
                source_points.position(&slot.name),
                output.point_data.position(&slot.name),
            ) else {
                continue;
            };
            if source_points.arrays()[si].components() != slot.components {
                log::warn!(
                    "skipping array '{}': component count differs from field list",
                    slot.name
                );
                continue;
            }
            if categorical && scalars_name == Some(slot.name.as_str()) {
                categorical_pair = Some(point_pairs.len());
            }
            point_pairs.push((si, di));
        }

        let cell_pairs = fields
            .cell_slots()
            .iter()
            .filter_map(|slot| {
                let si = source_cells.position(&slot.name)?;
                let di = output.point_data.position(&slot.name)?;
                (source_cells.arrays()[si].components() == slot.components).then_some((si, di))
            })
            .collect();

        Self {
            point_pairs,
            cell_pairs,
            categorical_pair,
        }
    }
}
