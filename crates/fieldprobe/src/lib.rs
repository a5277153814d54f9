//! Probing and streamline integration over mesh datasets.
//!
//! The entry points are:
//! - [`ProbeFilter`]: sample a source dataset's attributes at arbitrary
//!   points, or at the nodes of a regular grid via a faster inverted
//!   search
//! - [`StreamTracer`]: advect seed points through a velocity field,
//!   collecting attributes, vorticity, and rotation along each line
//!
//! Datasets and cell geometry live in [`fieldprobe_mesh`]; arrays, field
//! mapping, and options in [`fieldprobe_core`]. Both are re-exported here
//! so most users need only this crate.

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]

pub mod probe;
pub mod tracer;

pub use probe::{ProbeFilter, SearchStrategy, CELL_TOLERANCE_FACTOR_SQR};
pub use tracer::{
    IntegrationDirection, Interval, RungeKutta2, RungeKutta4, RungeKutta45, Solver, StepUnit,
    StreamTracer, StreamTracerOptions, Streamline, TerminationReason,
};

pub use fieldprobe_core::{
    AttributeArray, AttributeSet, FieldProbeError, ProbeOptions, ProbeOutput, Result,
    VALID_POINT_MASK_NAME,
};
pub use fieldprobe_mesh::{CellLocator, Dataset, ImageGrid, UnstructuredGrid};
