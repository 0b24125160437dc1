//! In-memory spherical k-nearest-neighbor index over geographic points.
//!
//! Values — arbitrary payloads tagged by a unique string key and located
//! by latitude/longitude — live in an adaptively split tree of S2 cells.
//! Queries stream stored values through a callback in order of increasing
//! spherical distance from a focal point, stopping when the callback asks
//! to or when the supplied cancellation token fires.
//!
//! ```rust
//! use geoknn::{CancellationToken, Knn};
//!
//! let index = Knn::new(14)?;
//! index.add_value("dresden", 1, 51.0504, 13.7373);
//! index.add_value("origin", 3, 0.0, 0.0);
//!
//! let mut payloads = Vec::new();
//! index.search(&CancellationToken::new(), 30.123, 10.123, |value| {
//!     payloads.push(*value.payload());
//!     false
//! });
//! assert_eq!(payloads, vec![1, 3]);
//! # Ok::<(), geoknn::KnnError>(())
//! ```

mod cell;
mod error;
mod knn;
mod node;
mod value;

pub use cell::{EARTH_RADIUS_KM, MAX_PRECISION, MAX_VALUES_PER_CELL, MIN_PRECISION};
pub use error::{KnnError, Result};
pub use knn::{IndexStats, Knn};
pub use value::Value;

pub use geo::Point;
pub use tokio_util::sync::CancellationToken;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::{CancellationToken, IndexStats, Knn, KnnError, Result, Value};
}
