//! Domain types shared by the cache components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Present on a payload when the live search failed; the value is the reason.
pub const ERROR_KEY: &str = "error";
/// Set on every payload handed back by the resolver.
pub const STATUS_KEY: &str = "_cache_status";
/// Bookkeeping written into entry files only.
pub const ORIGINAL_QUERY_KEY: &str = "_cached_original_query";
/// Bookkeeping written into entry files only.
pub const TIMESTAMP_KEY: &str = "_cache_timestamp";

pub const RESERVED_KEYS: [&str; 4] = [ERROR_KEY, STATUS_KEY, ORIGINAL_QUERY_KEY, TIMESTAMP_KEY];

/// Named text sections produced by a live search (one per scraped source)
/// plus the reserved keys above.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, String>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// A failure payload carrying only an `error` reason.
    pub fn from_error(reason: impl Into<String>) -> Self {
        let mut payload = Self::new();
        payload.insert(ERROR_KEY, reason);
        payload
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn error(&self) -> Option<&str> {
        self.get(ERROR_KEY)
    }

    pub fn is_failure(&self) -> bool {
        self.0.contains_key(ERROR_KEY)
    }

    pub fn status(&self) -> Option<&str> {
        self.get(STATUS_KEY)
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.insert(STATUS_KEY, status);
    }

    /// Free-form sections, i.e. everything but the reserved keys.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn has_sections(&self) -> bool {
        self.sections().next().is_some()
    }

    /// Copy without the transient `_cache_status` and the entry-file bookkeeping.
    pub fn without_bookkeeping(&self) -> Self {
        self.0
            .iter()
            .filter(|(k, _)| ![STATUS_KEY, ORIGINAL_QUERY_KEY, TIMESTAMP_KEY].contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl From<BTreeMap<String, String>> for Payload {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One cached live-search result as held by the entry store.
///
/// - `query_hash`: digest of `original_query`, also the file stem
/// - `payload`: the result with bookkeeping keys stripped
/// - `storage_path`: the entry file
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub original_query: String,
    pub query_hash: String,
    pub payload: Payload,
    pub cached_at: DateTime<Utc>,
    pub storage_path: PathBuf,
}

/// Maps a vector-index row back to the query and entry file it came from.
///
/// `storage_path` is `None` once the row has been retired because its entry
/// file disappeared; the row keeps its slot so record and vector counts agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub row_id: u64,
    pub original_query: String,
    pub storage_path: Option<PathBuf>,
}

impl IndexRecord {
    pub fn is_retired(&self) -> bool {
        self.storage_path.is_none()
    }
}

/// Result of a top-1 search: the row and its inner product with the query vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row_id: u64,
    pub score: f32,
}
