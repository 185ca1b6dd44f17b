//! Row id → (original query, entry path) table, persisted as JSON:
//!
//! ```json
//! { "next_id": 2, "mapping": { "0": ["query", "/cache/ab12.json"], "1": ["other", null] } }
//! ```
//!
//! A `null` path marks a retired row.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use searchcache_core::IndexRecord;

use crate::{io_error, IndexError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMapping {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    mapping: BTreeMap<u64, (String, Option<PathBuf>)>,
}

impl IndexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Number of records, retired ones included.
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn retired_len(&self) -> usize {
        self.mapping.values().filter(|(_, path)| path.is_none()).count()
    }

    pub fn get(&self, row_id: u64) -> Option<IndexRecord> {
        self.mapping.get(&row_id).map(|(query, path)| IndexRecord {
            row_id,
            original_query: query.clone(),
            storage_path: path.clone(),
        })
    }

    pub fn is_retired(&self, row_id: u64) -> bool {
        matches!(self.mapping.get(&row_id), Some((_, None)))
    }

    /// Record `row_id`. An existing record is never overwritten.
    pub fn insert(&mut self, row_id: u64, query: &str, path: &Path) -> Result<(), IndexError> {
        match self.mapping.entry(row_id) {
            Entry::Occupied(_) => Err(IndexError::RowTaken { row_id }),
            Entry::Vacant(slot) => {
                slot.insert((query.to_string(), Some(path.to_path_buf())));
                self.next_id = self.next_id.max(row_id + 1);
                Ok(())
            }
        }
    }

    /// True when the keys are exactly `0..rows`, one record per index row.
    pub fn covers_rows(&self, rows: usize) -> bool {
        self.mapping.len() == rows && self.mapping.keys().all(|row_id| *row_id < rows as u64)
    }

    /// Drop the entry path of `row_id`. Returns false if there was no live
    /// record to retire.
    pub(crate) fn retire(&mut self, row_id: u64) -> bool {
        match self.mapping.get_mut(&row_id) {
            Some((_, path)) if path.is_some() => {
                *path = None;
                true
            }
            _ => false,
        }
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let text = fs::read_to_string(path).map_err(io_error(path))?;
        serde_json::from_str(&text).map_err(json_error(path))
    }

    /// Write through a temp file and rename, like the vector index.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let text = serde_json::to_string_pretty(self).map_err(json_error(path))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(io_error(&tmp))?;
        fs::rename(&tmp, path).map_err(io_error(path))
    }
}

fn json_error(path: &Path) -> impl FnOnce(serde_json::Error) -> IndexError {
    let path = path.to_path_buf();
    move |source| IndexError::Mapping { path, source }
}
