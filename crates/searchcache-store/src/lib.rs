//! Content-addressed entry files: one JSON file per cached query, named by
//! the blake3 digest of the query text.
//!
//! An entry file holds the payload keys plus `_cached_original_query` and
//! `_cache_timestamp` (seconds since the epoch, fractional). Both are
//! stripped again on read.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use searchcache_core::{CacheEntry, Payload};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize entry for {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("corrupt entry file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Serialize, Deserialize)]
struct EntryFile {
    #[serde(rename = "_cached_original_query", default)]
    original_query: String,
    #[serde(rename = "_cache_timestamp", default)]
    cached_at: Option<f64>,
    #[serde(flatten)]
    payload: BTreeMap<String, String>,
}

/// Digest used as the storage key of a query. Exact bytes, no normalization.
pub fn query_hash(query: &str) -> String {
    blake3::hash(query.as_bytes()).to_hex().to_string()
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

fn is_entry_file(path: &Path) -> bool {
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let stem_is_digest = path
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()));
    is_json && stem_is_digest
}

#[derive(Debug, Clone)]
pub struct EntryStore {
    dir: PathBuf,
}

impl EntryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, query: &str) -> PathBuf {
        self.dir.join(format!("{}.json", query_hash(query)))
    }

    /// Write `payload` for `query` and return the entry path. The transient
    /// `_cache_status` is not persisted. Writing the same query twice
    /// overwrites the earlier file.
    pub fn put(&self, query: &str, payload: &Payload) -> Result<PathBuf, StoreError> {
        let path = self.path_for(query);
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let now = Utc::now();
        let file = EntryFile {
            original_query: query.to_string(),
            cached_at: Some(now.timestamp_millis() as f64 / 1000.0),
            payload: payload.without_bookkeeping().into_inner(),
        };
        let text = serde_json::to_string_pretty(&file).map_err(|source| StoreError::Serialize {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, text).map_err(io_error(&path))?;
        debug!(path = %path.display(), "wrote cache entry");
        Ok(path)
    }

    /// Read an entry. A missing file is `Ok(None)`: it may have been removed
    /// out-of-band and the caller decides how to heal.
    pub fn get(&self, path: &Path) -> Result<Option<CacheEntry>, StoreError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(path)(source)),
        };
        let file: EntryFile = serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        let cached_at = file
            .cached_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp_millis((secs * 1000.0) as i64))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let query_hash = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| query_hash(&file.original_query));
        let payload = Payload::from(file.payload);
        Ok(Some(CacheEntry {
            original_query: file.original_query,
            query_hash,
            payload: payload.without_bookkeeping(),
            cached_at,
            storage_path: path.to_path_buf(),
        }))
    }

    /// Entry files currently on disk, sorted by path.
    pub fn list_entries(&self) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = walkdir::WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_entry_file(e.path()))
            .map(|e| e.into_path())
            .collect();
        entries.sort();
        entries
    }
}
