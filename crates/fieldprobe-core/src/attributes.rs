//! Attribute set: an ordered, name-addressable collection of arrays.

use crate::array::AttributeArray;
use crate::error::{FieldProbeError, Result};

/// A collection of attribute arrays attached to the points or cells of a
/// dataset.
///
/// One array may be designated as the active scalars; categorical probing
/// applies nearest-neighbor selection to that array only.
#[derive(Debug, Clone, Default)]
pub struct AttributeSet {
    arrays: Vec<AttributeArray>,
    active_scalars: Option<usize>,
    categorical: bool,
}

impl AttributeSet {
    /// Creates an empty attribute set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an array to the set.
    ///
    /// # Errors
    /// Returns [`FieldProbeError::ArrayExists`] if an array with the same
    /// name is already present.
    pub fn add_array(&mut self, array: AttributeArray) -> Result<()> {
        if self.has_array(array.name()) {
            return Err(FieldProbeError::ArrayExists(array.name().to_string()));
        }
        self.arrays.push(array);
        Ok(())
    }

    /// Adds an array and marks it as the active scalars.
    ///
    /// # Errors
    /// Returns [`FieldProbeError::ArrayExists`] on a name collision.
    pub fn add_scalars(&mut self, array: AttributeArray) -> Result<()> {
        self.add_array(array)?;
        self.active_scalars = Some(self.arrays.len() - 1);
        Ok(())
    }

    /// Returns true if an array with the given name exists.
    #[must_use]
    pub fn has_array(&self, name: &str) -> bool {
        self.arrays.iter().any(|a| a.name() == name)
    }

    /// Looks up an array by name.
    #[must_use]
    pub fn array(&self, name: &str) -> Option<&AttributeArray> {
        self.arrays.iter().find(|a| a.name() == name)
    }

    /// Looks up an array by name, mutably.
    pub fn array_mut(&mut self, name: &str) -> Option<&mut AttributeArray> {
        self.arrays.iter_mut().find(|a| a.name() == name)
    }

    /// Returns all arrays in insertion order.
    #[must_use]
    pub fn arrays(&self) -> &[AttributeArray] {
        &self.arrays
    }

    /// Returns all arrays mutably, in insertion order.
    pub fn arrays_mut(&mut self) -> &mut [AttributeArray] {
        &mut self.arrays
    }

    /// Returns the position of the named array, if present.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.arrays.iter().position(|a| a.name() == name)
    }

    /// Returns the number of arrays.
    #[must_use]
    pub fn num_arrays(&self) -> usize {
        self.arrays.len()
    }

    /// Returns the active scalar array, if one is designated.
    #[must_use]
    pub fn scalars(&self) -> Option<&AttributeArray> {
        self.active_scalars.map(|i| &self.arrays[i])
    }

    /// Returns the name of the active scalar array.
    #[must_use]
    pub fn scalars_name(&self) -> Option<&str> {
        self.scalars().map(AttributeArray::name)
    }

    /// Marks the named array as the active scalars.
    ///
    /// # Errors
    /// Returns [`FieldProbeError::ArrayNotFound`] if no such array exists.
    pub fn set_scalars(&mut self, name: &str) -> Result<()> {
        match self.arrays.iter().position(|a| a.name() == name) {
            Some(i) => {
                self.active_scalars = Some(i);
                Ok(())
            }
            None => Err(FieldProbeError::ArrayNotFound(name.to_string())),
        }
    }

    /// Returns whether the active scalars hold categorical (label) data.
    #[must_use]
    pub fn is_categorical(&self) -> bool {
        self.categorical
    }

    /// Flags the active scalars as categorical data.
    pub fn set_categorical(&mut self, categorical: bool) {
        self.categorical = categorical;
    }
}
