use crate::types::Payload;

/// What an embedding is computed for. Providers may embed queries and stored
/// documents differently; the cache only ever embeds queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedPurpose {
    Query,
    Document,
}

impl EmbedPurpose {
    /// Task type understood by the Gemini embedding API.
    pub fn task_type(self) -> &'static str {
        match self {
            EmbedPurpose::Query => "RETRIEVAL_QUERY",
            EmbedPurpose::Document => "RETRIEVAL_DOCUMENT",
        }
    }
}

pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `gemini:models/embedding-001`).
    fn model_id(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    /// Embed a single, already trimmed, non-empty text.
    fn embed(&self, text: &str, purpose: EmbedPurpose) -> anyhow::Result<Vec<f32>>;
}

/// The expensive operation sitting behind the cache.
///
/// Failure is reported in-band: the returned payload carries an `error` key.
pub trait LiveSearch: Send + Sync {
    fn perform_live_search(&self, query: &str) -> Payload;
}
