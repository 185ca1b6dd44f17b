use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use searchcache_core::{IndexRecord, SearchHit};

use crate::index::FlatIndex;
use crate::mapping::IndexMapping;
use crate::{io_error, IndexError};

/// The vector index and its mapping, treated as one unit.
///
/// Invariant: the mapping keys are exactly `0..index.len()`, and record `i`
/// describes vector `i`. `append` is the only operation that grows either side.
#[derive(Debug)]
pub struct CacheIndex {
    index: FlatIndex,
    mapping: IndexMapping,
    index_path: PathBuf,
    mapping_path: PathBuf,
}

impl CacheIndex {
    pub fn empty(
        index_path: impl Into<PathBuf>,
        mapping_path: impl Into<PathBuf>,
        dim: usize,
    ) -> Self {
        Self {
            index: FlatIndex::new(dim),
            mapping: IndexMapping::new(),
            index_path: index_path.into(),
            mapping_path: mapping_path.into(),
        }
    }

    /// Load both files. Any missing or unreadable file, or a mapping whose
    /// rows are not exactly the index rows, yields an empty cache rather
    /// than an error.
    pub fn open(
        index_path: impl Into<PathBuf>,
        mapping_path: impl Into<PathBuf>,
        dim: usize,
    ) -> Self {
        let index_path = index_path.into();
        let mapping_path = mapping_path.into();
        if !index_path.exists() && !mapping_path.exists() {
            info!(
                dir = %display_parent(&index_path),
                "no cache files found; starting with an empty cache"
            );
            return Self::empty(index_path, mapping_path, dim);
        }

        let index = match FlatIndex::load(&index_path, dim) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "vector index unusable; resetting cache");
                return Self::empty(index_path, mapping_path, dim);
            }
        };
        let mapping = match IndexMapping::load(&mapping_path) {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!(error = %e, "index mapping unusable; resetting cache");
                return Self::empty(index_path, mapping_path, dim);
            }
        };

        if !mapping.covers_rows(index.len()) {
            warn!(
                vectors = index.len(),
                records = mapping.len(),
                "cache inconsistency: mapping rows do not match the index; resetting cache"
            );
            return Self::empty(index_path, mapping_path, dim);
        }
        if mapping.next_id() != index.len() as u64 {
            warn!(
                vectors = index.len(),
                next_id = mapping.next_id(),
                "cache next_id does not match index size"
            );
        }

        info!(items = index.len(), retired = mapping.retired_len(), "loaded semantic cache");
        Self {
            index,
            mapping,
            index_path,
            mapping_path,
        }
    }

    pub fn dim(&self) -> usize {
        self.index.dim()
    }

    /// Number of indexed rows, retired ones included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn retired_len(&self) -> usize {
        self.mapping.retired_len()
    }

    /// Rows that can still produce a hit.
    pub fn live_len(&self) -> usize {
        self.len().saturating_sub(self.retired_len())
    }

    pub fn mapping_len(&self) -> usize {
        self.mapping.len()
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn mapping_path(&self) -> &Path {
        &self.mapping_path
    }

    pub fn record(&self, row_id: u64) -> Option<IndexRecord> {
        self.mapping.get(row_id)
    }

    /// Top-1 search over rows that are not retired.
    pub fn search_top1(&self, v: &[f32]) -> Result<Option<SearchHit>, IndexError> {
        let mapping = &self.mapping;
        self.index.search_top1_excluding(v, |row_id| mapping.is_retired(row_id))
    }

    /// Append a vector together with its record. The vector is validated
    /// before either side changes, so a failure leaves both untouched.
    pub fn append(
        &mut self,
        vector: &[f32],
        query: &str,
        storage_path: &Path,
    ) -> Result<u64, IndexError> {
        self.index.check_dim(vector)?;
        let row_id = self.index.len() as u64;
        self.mapping.insert(row_id, query, storage_path)?;
        self.index.append(vector)?;
        debug!(row_id, "appended cache row");
        Ok(row_id)
    }

    /// Mark a row whose entry file is gone. The vector stays so counts keep
    /// matching, but the row is no longer searchable.
    pub fn retire(&mut self, row_id: u64) -> bool {
        let retired = self.mapping.retire(row_id);
        if retired {
            debug!(row_id, "retired cache row");
        }
        retired
    }

    /// Persist the index, then the mapping. Nothing is written for an empty cache.
    pub fn save(&self) -> Result<(), IndexError> {
        if self.is_empty() {
            debug!("skipping cache save: index is empty");
            return Ok(());
        }
        for dir in [self.index_path.parent(), self.mapping_path.parent()].into_iter().flatten() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(io_error(dir))?;
            }
        }
        self.index.save(&self.index_path)?;
        self.mapping.save(&self.mapping_path)?;
        debug!(items = self.len(), "saved semantic cache");
        Ok(())
    }
}

fn display_parent(path: &Path) -> String {
    path.parent().map(|p| p.display().to_string()).unwrap_or_default()
}
