//! Flat attribute array storage.
//!
//! An [`AttributeArray`] is a named array of fixed-size tuples stored
//! contiguously, the unit of data that probing interpolates. All values are
//! `f64`; integer-valued source data (zone ids, labels) is carried as exact
//! doubles and interpolated nearest-neighbor in categorical mode.

use crate::error::{FieldProbeError, Result};

/// A named array of `components`-sized tuples.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeArray {
    name: String,
    components: usize,
    values: Vec<f64>,
}

impl AttributeArray {
    /// Creates an array from existing tuple data.
    ///
    /// # Errors
    /// Returns [`FieldProbeError::SizeMismatch`] if `values.len()` is not a
    /// multiple of `components`.
    pub fn from_values(
        name: impl Into<String>,
        components: usize,
        values: Vec<f64>,
    ) -> Result<Self> {
        if components == 0 || values.len() % components != 0 {
            return Err(FieldProbeError::SizeMismatch {
                expected: components,
                actual: values.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            components,
            values,
        })
    }

    /// Creates a zero-filled array with `num_tuples` tuples.
    #[must_use]
    pub fn zeroed(name: impl Into<String>, components: usize, num_tuples: usize) -> Self {
        Self {
            name: name.into(),
            components,
            values: vec![0.0; components * num_tuples],
        }
    }

    /// Returns the array name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of components per tuple.
    #[must_use]
    pub fn components(&self) -> usize {
        self.components
    }

    /// Returns the number of tuples.
    #[must_use]
    pub fn num_tuples(&self) -> usize {
        self.values.len() / self.components
    }

    /// Returns the tuple at `idx`.
    ///
    /// # Panics
    /// Panics if `idx` is out of range.
    #[must_use]
    pub fn tuple(&self, idx: usize) -> &[f64] {
        &self.values[idx * self.components..(idx + 1) * self.components]
    }

    /// Overwrites the tuple at `idx`.
    ///
    /// # Panics
    /// Panics if `idx` is out of range or `tuple` has the wrong length.
    pub fn set_tuple(&mut self, idx: usize, tuple: &[f64]) {
        assert_eq!(tuple.len(), self.components);
        self.values[idx * self.components..(idx + 1) * self.components].copy_from_slice(tuple);
    }

    /// Appends a tuple at the end of the array.
    ///
    /// # Panics
    /// Panics if `tuple` has the wrong length.
    pub fn push_tuple(&mut self, tuple: &[f64]) {
        assert_eq!(tuple.len(), self.components);
        self.values.extend_from_slice(tuple);
    }

    /// Resets every value to zero.
    pub fn fill_zero(&mut self) {
        self.values.fill(0.0);
    }

    /// Returns the raw value slice.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Writes the weighted combination of `src` tuples into tuple `dst_idx`.
    ///
    /// `vertex_ids` and `weights` run in parallel; for valid parametric
    /// coordinates the weights sum to 1, making the result a convex
    /// combination of the cell's vertex values.
    ///
    /// # Panics
    /// Panics if `dst_idx` or any vertex id is out of range.
    pub fn interpolate_tuple(
        &mut self,
        dst_idx: usize,
        src: &AttributeArray,
        vertex_ids: &[u32],
        weights: &[f64],
    ) {
        let n = self.components;
        let dst = &mut self.values[dst_idx * n..(dst_idx + 1) * n];
        dst.fill(0.0);
        for (&id, &w) in vertex_ids.iter().zip(weights) {
            let t = src.tuple(id as usize);
            for (d, &v) in dst.iter_mut().zip(t) {
                *d += w * v;
            }
        }
    }

    /// Copies tuple `src_idx` of `src` into tuple `dst_idx` verbatim.
    ///
    /// Used for cell-centered attributes, which are constant over the
    /// winning cell and never blended.
    ///
    /// # Panics
    /// Panics if either index is out of range.
    pub fn copy_tuple(&mut self, dst_idx: usize, src: &AttributeArray, src_idx: usize) {
        let t = src.tuple(src_idx);
        self.set_tuple(dst_idx, t);
    }
}

/// Collapses a weight vector to a one-hot selection of its maximum entry.
///
/// Categorical data must never be blended (averaging zone ids 3 and 5 must
/// not produce 4), so the interpolation weights are replaced by a nearest
/// vertex selection before interpolating.
#[must_use]
pub fn one_hot_weights(weights: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; weights.len()];
    let mut best = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w > weights[best] {
            best = i;
        }
    }
    if !out.is_empty() {
        out[best] = 1.0;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_values_rejects_ragged() {
        assert!(AttributeArray::from_values("a", 3, vec![1.0, 2.0]).is_err());
        assert!(AttributeArray::from_values("a", 0, vec![]).is_err());
    }

    #[test]
    fn test_zeroed() {
        let a = AttributeArray::zeroed("mask", 1, 5);
        assert_eq!(a.num_tuples(), 5);
        assert!(a.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_interpolate_tuple_convex() {
        let src = AttributeArray::from_values("t", 2, vec![0.0, 10.0, 2.0, 20.0]).unwrap();
        let mut dst = AttributeArray::zeroed("t", 2, 1);
        dst.interpolate_tuple(0, &src, &[0, 1], &[0.25, 0.75]);
        assert_eq!(dst.tuple(0), &[1.5, 17.5]);
    }

    #[test]
    fn test_copy_tuple() {
        let src = AttributeArray::from_values("z", 1, vec![3.0, 5.0]).unwrap();
        let mut dst = AttributeArray::zeroed("z", 1, 2);
        dst.copy_tuple(1, &src, 0);
        assert_eq!(dst.tuple(1), &[3.0]);
    }

    #[test]
    fn test_one_hot_picks_maximum() {
        assert_eq!(one_hot_weights(&[0.1, 0.6, 0.3]), vec![0.0, 1.0, 0.0]);
        // ties resolve to the first maximum
        assert_eq!(one_hot_weights(&[0.5, 0.5]), vec![1.0, 0.0]);
    }

    proptest! {
        #[test]
        fn prop_one_hot_selects_a_single_best_vertex(
            weights in prop::collection::vec(-0.5..1.5f64, 1..9),
        ) {
            let selection = one_hot_weights(&weights);
            prop_assert_eq!(selection.len(), weights.len());
            let sum: f64 = selection.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-12);
            prop_assert_eq!(selection.iter().filter(|&&w| w != 0.0).count(), 1);
            let winner = selection.iter().position(|&w| w == 1.0).unwrap();
            prop_assert!(weights.iter().all(|&w| w <= weights[winner]));
        }
    }
}
