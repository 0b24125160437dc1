//! Error types for the index.

use thiserror::Error;

use crate::cell::{MAX_PRECISION, MIN_PRECISION};

/// Errors surfaced when constructing a [`Knn`](crate::Knn) index.
///
/// Out-of-range latitude/longitude is deliberately *not* represented here:
/// bad coordinates are a contract violation and abort with a diagnostic at
/// the API boundary instead of being returned to the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnnError {
    /// Requested tree depth lies outside the supported cell-level range.
    #[error(
        "invalid precision {0}: precision must be between {min} and {max}",
        min = MIN_PRECISION,
        max = MAX_PRECISION
    )]
    InvalidPrecision(i32),
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, KnnError>;
