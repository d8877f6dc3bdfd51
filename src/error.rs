//! # Error Types
//!
//! Every fallible operation in the library returns [`Result`], whose error
//! side is the [`Error`] enum below. The variants map one-to-one onto the
//! failure modes of the loader: a missing file, a file that is not a
//! readable NetCDF container, an unknown variable or timestamp, and a
//! dataset that has already been closed.
//!
//! An empty time-range selection is *not* an error; see
//! [`Dataset::slice_over_range`](crate::dataset::Dataset::slice_over_range).

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while opening, reading, rendering or exporting a dataset.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The dataset path does not resolve to a file.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// The file exists but is not a valid NetCDF container.
    #[error("not a readable NetCDF file: {} ({reason})", path.display())]
    Format { path: PathBuf, reason: String },

    /// No variable with this name exists in the dataset.
    #[error("variable '{name}' not found in dataset")]
    UnknownVariable { name: String },

    /// The timestamp is not part of the dataset's time index.
    #[error("timestamp {timestamp} not found in time index")]
    UnknownTimestamp { timestamp: String },

    /// The dataset handle was already released.
    #[error("dataset is already closed")]
    AlreadyClosed,

    /// A variable does not have the dimensionality an operation needs.
    #[error("variable '{name}' has dimensions [{}]: {expected}", dimensions.join(", "))]
    DimensionMismatch {
        name: String,
        dimensions: Vec<String>,
        expected: String,
    },

    /// Paired arrays (timestamps and values, axes and grid) disagree in length.
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: String, got: String },

    /// A time coordinate or a user-supplied timestamp could not be decoded.
    #[error("invalid time: {reason}")]
    InvalidTime { reason: String },

    /// Invalid job configuration or command-line parameter.
    #[error("configuration error: {0}")]
    Config(String),

    /// A figure could not be rendered.
    #[error("plot error: {0}")]
    Plot(String),

    /// Any other failure reported by the NetCDF library.
    #[error("netcdf error: {0}")]
    Netcdf(#[from] netcdf::Error),

    /// Tabular export failure.
    #[error("export error: {0}")]
    Export(#[from] polars::prelude::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the two lookup failures (unknown variable or timestamp).
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownVariable { .. } | Error::UnknownTimestamp { .. }
        )
    }
}
