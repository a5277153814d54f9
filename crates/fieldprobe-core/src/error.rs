//! Error types for fieldprobe.

use thiserror::Error;

/// The main error type for fieldprobe operations.
///
/// Note that a sample point falling outside the source dataset is *not* an
/// error: it is reported through the validity mask. These variants cover
/// configuration and setup problems that abort an entire pass.
#[derive(Error, Debug)]
pub enum FieldProbeError {
    /// Categorical mode was requested but the source has no active scalars.
    #[error("categorical probing requested but source has no active scalar array")]
    NoScalars,

    /// Categorical mode was requested but the active scalars are not single-component.
    #[error("categorical source scalars have {components} components, expected 1")]
    NonScalarCategories { components: usize },

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// An attribute array with the given name was not found.
    #[error("attribute array '{0}' not found")]
    ArrayNotFound(String),

    /// An attribute array with the given name already exists.
    #[error("attribute array '{0}' already exists")]
    ArrayExists(String),

    /// The dataset has no points or cells to work with.
    #[error("dataset '{0}' is empty")]
    EmptyDataset(String),

    /// Streamline tracing requested but no vector array is available.
    #[error("no vector array '{0}' on the source dataset")]
    NoVectors(String),
}

/// A specialized Result type for fieldprobe operations.
pub type Result<T> = std::result::Result<T, FieldProbeError>;
