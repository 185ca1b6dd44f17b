//! Append-only flat index scored by inner product.
//!
//! Vectors are expected to be unit length, so the score is the cosine
//! similarity. Rows are never removed or reordered; row ids are insertion
//! ordinals starting at 0.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use searchcache_core::SearchHit;

use crate::{io_error, IndexError};

const INDEX_MAGIC: [u8; 4] = *b"SCFX";
const INDEX_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexFile {
    magic: [u8; 4],
    version: u32,
    dim: u32,
    rows: u64,
    data: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn check_dim(&self, v: &[f32]) -> Result<(), IndexError> {
        if v.len() != self.dim || self.dim == 0 {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                actual: v.len(),
            });
        }
        Ok(())
    }

    /// Append `v` and return its row id (the count before insertion).
    pub fn append(&mut self, v: &[f32]) -> Result<u64, IndexError> {
        self.check_dim(v)?;
        let row_id = self.len() as u64;
        self.data.extend_from_slice(v);
        Ok(row_id)
    }

    pub fn vector(&self, row_id: u64) -> Option<&[f32]> {
        let start = usize::try_from(row_id).ok()?.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    /// Best-scoring row, or `None` when the index is empty. Ties keep the
    /// lowest row id.
    pub fn search_top1(&self, v: &[f32]) -> Result<Option<SearchHit>, IndexError> {
        self.search_top1_excluding(v, |_| false)
    }

    /// Like [`search_top1`](Self::search_top1) but never returns rows for
    /// which `skip` is true.
    pub fn search_top1_excluding<F>(
        &self,
        v: &[f32],
        skip: F,
    ) -> Result<Option<SearchHit>, IndexError>
    where
        F: Fn(u64) -> bool,
    {
        self.check_dim(v)?;
        let mut best: Option<SearchHit> = None;
        for (row, stored) in self.data.chunks_exact(self.dim).enumerate() {
            let row_id = row as u64;
            if skip(row_id) {
                continue;
            }
            let score: f32 = stored.iter().zip(v).map(|(a, b)| a * b).sum();
            if best.map_or(true, |b| score > b.score) {
                best = Some(SearchHit { row_id, score });
            }
        }
        Ok(best)
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let file = IndexFile {
            magic: INDEX_MAGIC,
            version: INDEX_VERSION,
            dim: self.dim as u32,
            rows: self.len() as u64,
            data: self.data.clone(),
        };
        let bytes = bincode::serialize(&file).map_err(|e| IndexError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        // Write beside the target and rename so readers never see a half-written index.
        let tmp = path.with_extension("idx.tmp");
        fs::write(&tmp, &bytes).map_err(io_error(&tmp))?;
        fs::rename(&tmp, path).map_err(io_error(path))?;
        debug!(rows = file.rows, path = %path.display(), "saved vector index");
        Ok(())
    }

    pub fn load(path: &Path, dim: usize) -> Result<Self, IndexError> {
        let bytes = fs::read(path).map_err(io_error(path))?;
        let corrupt = |reason: String| IndexError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };
        let file: IndexFile = bincode::deserialize(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if file.magic != INDEX_MAGIC {
            return Err(corrupt("bad magic".to_string()));
        }
        if file.version != INDEX_VERSION {
            return Err(corrupt(format!("unsupported version {}", file.version)));
        }
        if file.dim as usize != dim {
            return Err(corrupt(format!(
                "dimension {} does not match expected {}",
                file.dim, dim
            )));
        }
        let expected_len = usize::try_from(file.rows)
            .ok()
            .and_then(|rows| rows.checked_mul(dim));
        if expected_len != Some(file.data.len()) {
            return Err(corrupt(format!(
                "{} rows of dimension {} but {} values",
                file.rows,
                dim,
                file.data.len()
            )));
        }
        if file.data.iter().any(|x| !x.is_finite()) {
            return Err(corrupt("non-finite value".to_string()));
        }
        Ok(Self {
            dim,
            data: file.data,
        })
    }

    /// Load `path`, falling back to an empty index when the file is missing
    /// or unreadable.
    pub fn load_or_empty(path: &Path, dim: usize) -> Self {
        match Self::load(path, dim) {
            Ok(index) => index,
            Err(IndexError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Self::new(dim)
            }
            Err(e) => {
                warn!(error = %e, "discarding unreadable vector index");
                Self::new(dim)
            }
        }
    }
}
