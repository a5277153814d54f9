//! Core abstractions for fieldprobe.
//!
//! This crate provides the fundamental types used throughout fieldprobe:
//! - [`AttributeArray`] and [`AttributeSet`] for point- and cell-centered data
//! - [`FieldList`] for the precomputed source-to-output array mapping
//! - [`ProbeOutput`] for the interpolated arrays and validity mask
//! - [`ProbeOptions`] configuration

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Options structs legitimately have many boolean flags
#![allow(clippy::struct_excessive_bools)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]

pub mod array;
pub mod attributes;
pub mod error;
pub mod field_list;
pub mod options;

pub use array::{one_hot_weights, AttributeArray};
pub use attributes::AttributeSet;
pub use error::{FieldProbeError, Result};
pub use field_list::{FieldBinding, FieldList, FieldSlot, ProbeOutput, VALID_POINT_MASK_NAME};
pub use options::{ProbeOptions, SpatialMatch};

// Re-export glam types for convenience
pub use glam::{DMat3, DVec3, UVec3};
