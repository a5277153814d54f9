//! Mesh structures for fieldprobe.
//!
//! This crate provides the geometric side of probing:
//! - [`Cell`] and [`CellKind`] with shape functions and position evaluation
//! - the [`Dataset`] trait with [`UnstructuredGrid`] and [`ImageGrid`]
//! - [`CellLocator`], a uniform-bin spatial index for repeated queries

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]

pub mod cell;
pub mod dataset;
pub mod image;
pub mod locator;
pub mod unstructured;

pub use cell::{Cell, CellKind, Placement, PositionEval};
pub use dataset::{bounds_intersect, Dataset, FoundCell};
pub use image::ImageGrid;
pub use locator::CellLocator;
pub use unstructured::UnstructuredGrid;
