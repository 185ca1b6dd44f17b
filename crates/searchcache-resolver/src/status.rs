use std::fmt;

/// Why the cache could not answer a query on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    EmbeddingFailed,
    NormalizationFailed,
    EmptyIndex,
    SearchFailed,
    BelowThreshold,
    MappingInconsistent,
    StaleEntry,
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MissReason::EmbeddingFailed => "embedding failed",
            MissReason::NormalizationFailed => "normalization failed",
            MissReason::EmptyIndex => "empty index",
            MissReason::SearchFailed => "search failed",
            MissReason::BelowThreshold => "below threshold",
            MissReason::MappingInconsistent => "mapping inconsistent",
            MissReason::StaleEntry => "stale entry",
        };
        f.write_str(s)
    }
}

/// Which path `resolve` took. Its `Display` form is written to the payload's
/// `_cache_status`.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheStatus {
    /// Served from the cache.
    Hit { score: f32 },
    /// Live result, now cached.
    Cached { reason: MissReason },
    /// Live result that could not be cached because no vector was available.
    Uncached { reason: MissReason },
    /// Live result whose entry or index write failed.
    StoreFailed { reason: MissReason },
    /// Live search failed; nothing was cached.
    LiveFailed { reason: MissReason, error: String },
}

impl CacheStatus {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheStatus::Hit { .. })
    }

    pub fn miss_reason(&self) -> Option<MissReason> {
        match self {
            CacheStatus::Hit { .. } => None,
            CacheStatus::Cached { reason }
            | CacheStatus::Uncached { reason }
            | CacheStatus::StoreFailed { reason }
            | CacheStatus::LiveFailed { reason, .. } => Some(*reason),
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Hit { score } => write!(f, "hit: score={score:.4}"),
            CacheStatus::Cached { .. } => f.write_str("live: cached"),
            CacheStatus::Uncached { reason } => write!(f, "live: {reason}"),
            CacheStatus::StoreFailed { .. } => f.write_str("live: store write failed"),
            CacheStatus::LiveFailed { error, .. } => write!(f, "live failed: {error}"),
        }
    }
}
