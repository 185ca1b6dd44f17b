//! Embedding gateway: query text in, fixed-length vector out.
//!
//! The gateway validates input and output around an [`Embedder`] backend.
//! Vectors are returned as produced; normalization is the caller's job.

use searchcache_core::{CacheSettings, EmbedPurpose, Embedder};
use thiserror::Error;
use tracing::{debug, info};

pub mod fake;
pub mod gemini;

pub use fake::FakeEmbedder;
pub use gemini::GeminiEmbedder;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("cannot embed empty text")]
    EmptyInput,

    #[error("embedding provider failed: {0}")]
    Provider(String),

    #[error("embedding provider returned no vector")]
    NoVector,

    #[error("embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub struct EmbeddingGateway {
    embedder: Box<dyn Embedder>,
}

impl EmbeddingGateway {
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub fn dim(&self) -> usize {
        self.embedder.dim()
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    pub fn embed(&self, text: &str, purpose: EmbedPurpose) -> Result<Vec<f32>, EmbedError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let vector = self
            .embedder
            .embed(text, purpose)
            .map_err(|e| EmbedError::Provider(format!("{e:#}")))?;
        if vector.is_empty() {
            return Err(EmbedError::NoVector);
        }
        let expected = self.embedder.dim();
        if vector.len() != expected {
            return Err(EmbedError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        debug!(model = self.embedder.model_id(), dim = expected, ?purpose, "embedded text");
        Ok(vector)
    }
}

fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Respects `APP_USE_FAKE_EMBEDDINGS=1` to switch to the [`FakeEmbedder`] for
/// fast and deterministic outputs in tests and development; otherwise talks
/// to the configured Gemini model.
pub fn get_default_embedder(settings: &CacheSettings) -> anyhow::Result<Box<dyn Embedder>> {
    if use_fake_embeddings() {
        info!(dim = settings.embedding_dim, "using FakeEmbedder");
        return Ok(Box::new(FakeEmbedder::new(settings.embedding_dim)));
    }
    let embedder = GeminiEmbedder::from_settings(settings)?;
    info!(model = embedder.model_id(), "using Gemini embeddings");
    Ok(Box::new(embedder))
}
