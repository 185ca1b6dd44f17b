//! searchcache-vector
//!
//! Flat inner-product index over unit vectors (`index`), the durable
//! row-id → entry table (`mapping`), and `CacheIndex`, which keeps the two in
//! lock-step on disk and in memory.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod cache_index;
pub mod index;
pub mod mapping;
pub mod normalize;

pub use cache_index::CacheIndex;
pub use index::FlatIndex;
pub use mapping::IndexMapping;
pub use normalize::normalize;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector has dimension {actual}, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt index file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("row {row_id} already has a mapping record")]
    RowTaken { row_id: u64 },

    #[error("mapping file {path}: {source}")]
    Mapping {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// `map_err` adapter attaching `path` to an I/O failure.
pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> IndexError {
    let path = path.to_path_buf();
    move |source| IndexError::Io { path, source }
}
