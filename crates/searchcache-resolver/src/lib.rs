//! searchcache-resolver
//!
//! The cache coordinator: embed the query, look for a close-enough earlier
//! query, and either serve its stored result or run the live search and
//! remember the answer.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use searchcache_core::types::ERROR_KEY;
use searchcache_core::{CacheSettings, EmbedPurpose, Embedder, Error, LiveSearch, Payload, Result};
use searchcache_embed::EmbeddingGateway;
use searchcache_store::EntryStore;
use searchcache_vector::{normalize, CacheIndex};

pub mod live;
pub mod status;

pub use live::CommandLiveSearch;
pub use status::{CacheStatus, MissReason};

/// Returned by [`SemanticCache::resolve`]. `payload["_cache_status"]` is
/// always `status.to_string()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub payload: Payload,
    pub status: CacheStatus,
}

/// Snapshot of the cache for display.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheInfo {
    pub items: usize,
    pub retired: usize,
    pub entry_files: usize,
    pub directory: PathBuf,
    pub threshold: f32,
    pub dimension: usize,
    pub model: String,
}

impl CacheInfo {
    /// Read the cache files described by `settings` without building an
    /// embedder. `model` is the configured embedding model.
    pub fn inspect(settings: &CacheSettings) -> Result<Self> {
        settings.validate()?;
        let index = CacheIndex::open(
            settings.index_path(),
            settings.mapping_path(),
            settings.embedding_dim,
        );
        let store = EntryStore::new(settings.cache_dir());
        Ok(Self {
            items: index.len(),
            retired: index.retired_len(),
            entry_files: store.list_entries().len(),
            directory: store.dir().to_path_buf(),
            threshold: settings.similarity_threshold,
            dimension: index.dim(),
            model: settings.embedding_model.clone(),
        })
    }
}

enum Lookup {
    Hit {
        payload: Payload,
        score: f32,
    },
    Miss {
        reason: MissReason,
        vector: Option<Vec<f32>>,
    },
}

impl Lookup {
    fn unembedded(reason: MissReason) -> Self {
        Lookup::Miss {
            reason,
            vector: None,
        }
    }
}

pub struct SemanticCache {
    gateway: EmbeddingGateway,
    live: Box<dyn LiveSearch>,
    store: EntryStore,
    index: Mutex<CacheIndex>,
    threshold: f32,
}

impl SemanticCache {
    /// Load (or start) the cache described by `settings`.
    pub fn open(
        settings: &CacheSettings,
        embedder: Box<dyn Embedder>,
        live: Box<dyn LiveSearch>,
    ) -> Result<Self> {
        settings.validate()?;
        if embedder.dim() != settings.embedding_dim {
            return Err(Error::InvalidConfig(format!(
                "embedder {} produces {} dimensions but embedding_dim is {}",
                embedder.model_id(),
                embedder.dim(),
                settings.embedding_dim
            )));
        }
        let index = CacheIndex::open(
            settings.index_path(),
            settings.mapping_path(),
            settings.embedding_dim,
        );
        Ok(Self {
            gateway: EmbeddingGateway::new(embedder),
            live,
            store: EntryStore::new(settings.cache_dir()),
            index: Mutex::new(index),
            threshold: settings.similarity_threshold,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Indexed rows, retired ones included.
    pub fn len(&self) -> usize {
        self.lock_index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_index().is_empty()
    }

    pub fn info(&self) -> CacheInfo {
        let index = self.lock_index();
        CacheInfo {
            items: index.len(),
            retired: index.retired_len(),
            entry_files: self.store.list_entries().len(),
            directory: self.store.dir().to_path_buf(),
            threshold: self.threshold,
            dimension: index.dim(),
            model: self.gateway.model_id().to_string(),
        }
    }

    /// Answer `query` from the cache when a stored query is at least
    /// `threshold` similar, otherwise from the live search.
    ///
    /// Only an empty query is an error; every other failure degrades to a
    /// live search and is reported through [`CacheStatus`].
    pub fn resolve(&self, query: &str) -> Result<Resolution> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::EmptyQuery);
        }
        debug!(query, "resolving");

        let (mut payload, status) = match self.lookup(query) {
            Lookup::Hit { payload, score } => {
                info!(query, score, "cache hit");
                (payload, CacheStatus::Hit { score })
            }
            Lookup::Miss { reason, vector } => {
                info!(query, %reason, "cache miss; performing live search");
                self.resolve_live(query, reason, vector)
            }
        };
        payload.set_status(status.to_string());
        Ok(Resolution { payload, status })
    }

    fn lock_index(&self) -> MutexGuard<'_, CacheIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, query: &str) -> Lookup {
        let raw = match self.gateway.embed(query, EmbedPurpose::Query) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "embedding failed; skipping cache");
                return Lookup::unembedded(MissReason::EmbeddingFailed);
            }
        };
        let Some(vector) = normalize(&raw) else {
            warn!("query embedding is degenerate; skipping cache");
            return Lookup::unembedded(MissReason::NormalizationFailed);
        };

        let mut index = self.lock_index();
        let miss = |reason| Lookup::Miss {
            reason,
            vector: Some(vector.clone()),
        };
        if index.is_empty() {
            return miss(MissReason::EmptyIndex);
        }
        let hit = match index.search_top1(&vector) {
            Ok(Some(hit)) => hit,
            Ok(None) => return miss(MissReason::EmptyIndex),
            Err(e) => {
                warn!(error = %e, "vector search failed");
                return miss(MissReason::SearchFailed);
            }
        };
        debug!(
            row_id = hit.row_id,
            score = hit.score,
            threshold = self.threshold,
            "nearest cached query"
        );
        if hit.score < self.threshold {
            return miss(MissReason::BelowThreshold);
        }

        let Some(record) = index.record(hit.row_id) else {
            warn!(row_id = hit.row_id, "index row has no mapping record");
            return miss(MissReason::MappingInconsistent);
        };
        let Some(path) = record.storage_path else {
            return miss(MissReason::StaleEntry);
        };
        match self.store.get(&path) {
            Ok(Some(entry)) => {
                debug!(
                    cached_query = %entry.original_query,
                    path = %path.display(),
                    "loaded cached entry"
                );
                Lookup::Hit {
                    payload: entry.payload,
                    score: hit.score,
                }
            }
            outcome => {
                match outcome {
                    Err(e) => warn!(
                        error = %e,
                        row_id = hit.row_id,
                        "cache entry unreadable; retiring row"
                    ),
                    _ => warn!(
                        path = %path.display(),
                        row_id = hit.row_id,
                        "cache entry file missing; retiring row"
                    ),
                }
                index.retire(hit.row_id);
                if let Err(e) = index.save() {
                    warn!(error = %e, "failed to persist retired row");
                }
                miss(MissReason::StaleEntry)
            }
        }
    }

    fn resolve_live(
        &self,
        query: &str,
        reason: MissReason,
        vector: Option<Vec<f32>>,
    ) -> (Payload, CacheStatus) {
        let mut payload = self.live.perform_live_search(query);

        if let Some(error) = payload.error() {
            warn!(query, error, "live search failed; not caching");
            let error = error.to_string();
            return (payload, CacheStatus::LiveFailed { reason, error });
        }
        if !payload.has_sections() {
            let error = "Live search returned empty results.".to_string();
            warn!(query, "live search returned no sections; not caching");
            payload.insert(ERROR_KEY, error.clone());
            return (payload, CacheStatus::LiveFailed { reason, error });
        }

        let status = match vector {
            Some(vector) => self.store_and_index(query, &payload, &vector, reason),
            None => CacheStatus::Uncached { reason },
        };
        (payload, status)
    }

    /// Write the entry, append vector and record, persist both: one critical
    /// section so concurrent misses cannot interleave row ids.
    fn store_and_index(
        &self,
        query: &str,
        payload: &Payload,
        vector: &[f32],
        reason: MissReason,
    ) -> CacheStatus {
        let mut index = self.lock_index();
        let path = match self.store.put(query, payload) {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "failed to write cache entry");
                return CacheStatus::StoreFailed { reason };
            }
        };
        let row_id = match index.append(vector, query, &path) {
            Ok(row_id) => row_id,
            Err(e) => {
                warn!(error = %e, "failed to index cache entry");
                return CacheStatus::StoreFailed { reason };
            }
        };
        if let Err(e) = index.save() {
            // In-memory state stays ahead of disk until the next successful save.
            warn!(error = %e, "failed to persist semantic cache");
        }
        info!(query, row_id, items = index.len(), "cached live result");
        CacheStatus::Cached { reason }
    }
}
