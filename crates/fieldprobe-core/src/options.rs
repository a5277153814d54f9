//! Configuration options for probing.

use serde::{Deserialize, Serialize};

/// How sample pieces map to source pieces under a parallel decomposition.
///
/// Piece distribution itself is an external concern; the flag is carried
/// so callers can record which subset of samples a worker is responsible
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SpatialMatch {
    /// Probe the whole source on every piece.
    #[default]
    None,
    /// Sample piece N probes source piece N.
    Matched,
    /// Whole samples everywhere, source divided by piece.
    Partial,
}

/// Configuration for a probing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOptions {
    /// Treat the source's active scalars as categorical labels and
    /// interpolate them nearest-neighbor instead of blending.
    pub categorical: bool,

    /// Copy the sample geometry's own point arrays through to the output.
    pub pass_point_arrays: bool,

    /// Copy the sample geometry's own cell arrays through to the output.
    pub pass_cell_arrays: bool,

    /// Keep field (dataset-global) arrays on the output.
    pub pass_field_arrays: bool,

    /// Fixed search tolerance, used when `compute_tolerance` is off.
    pub tolerance: f64,

    /// Derive the tolerance from the source's cell sizes instead of
    /// using the fixed `tolerance`.
    pub compute_tolerance: bool,

    /// Piece-mapping mode under parallel decomposition.
    pub spatial_match: SpatialMatch,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            categorical: false,
            pass_point_arrays: false,
            pass_cell_arrays: false,
            pass_field_arrays: true,
            tolerance: 1.0,
            compute_tolerance: true,
            spatial_match: SpatialMatch::None,
        }
    }
}
