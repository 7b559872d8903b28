//! The error taxonomy for the analysis pipeline.

use crate::AboveMaxLen;
use std::path::PathBuf;

/// A specialized `Result` type for analysis operations.
pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;

/// Every terminal condition the analysis pipeline can report.
///
/// A failed analysis always produces exactly one of these, never a partial report.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The input image could not be read or decoded. The message is the decoder's own.
    #[error("{0}")]
    InputDecode(String),

    /// The pixel buffer does not match the declared grid dimensions.
    #[error("pixel buffer has {actual} bytes, expected {expected}")]
    InvalidGrid {
        /// `width * height * channels`.
        expected: usize,
        /// The length of the buffer that was provided.
        actual: usize,
    },

    /// The grid has more pixels than the crate supports.
    #[error("image is too large: {0}")]
    TooLarge(#[from] AboveMaxLen<u32>),

    /// The color histogram was empty after transparency and background filtering.
    #[error("no colors found after filtering")]
    NoColorsFound,

    /// The sampling stage produced no samples to cluster.
    #[error("no samples available for clustering")]
    NoSamplesAvailable,

    /// The reference table has no entries to match against.
    #[error("reference table is empty")]
    NoReferenceData,

    /// The reference table file could not be read.
    #[error("failed to read reference table {path}: {source}")]
    ReferenceRead {
        /// The path that was being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The reference table could not be parsed.
    #[error("invalid reference table: {0}")]
    ReferenceParse(#[from] serde_json::Error),
}
