//! Gemini `embedContent` provider.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

use searchcache_core::{CacheSettings, EmbedPurpose, Embedder};

pub struct GeminiEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    dim: usize,
    id: String,
}

impl GeminiEmbedder {
    pub fn from_settings(settings: &CacheSettings) -> Result<Self> {
        let api_key = settings.api_key().ok_or_else(|| {
            anyhow!("no Gemini API key: set cache.gemini_api_key or GEMINI_API_KEY")
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.embedding_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(
            client,
            &settings.embedding_base_url,
            &settings.embedding_model,
            api_key,
            settings.embedding_dim,
        ))
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        model: &str,
        api_key: impl Into<String>,
        dim: usize,
    ) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        let id = format!("gemini:{model}:d{dim}");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key: api_key.into(),
            dim,
            id,
        }
    }

    pub fn embed_url(&self) -> String {
        format!("{}/v1beta/{}:embedContent", self.base_url, self.model)
    }

    pub fn build_request(&self, text: &str, purpose: EmbedPurpose) -> serde_json::Value {
        json!({
            "model": self.model,
            "content": { "parts": [{ "text": text }] },
            "taskType": purpose.task_type(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

/// Extract the vector from an `embedContent` response body. A response
/// without values yields an empty vector, which the gateway reports as
/// "no vector".
pub fn parse_response(json: serde_json::Value) -> Result<Vec<f32>> {
    let response: EmbedContentResponse =
        serde_json::from_value(json).context("Failed to parse embedding response")?;
    Ok(response.embedding.map(|e| e.values).unwrap_or_default())
}

impl Embedder for GeminiEmbedder {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str, purpose: EmbedPurpose) -> Result<Vec<f32>> {
        let body = self.build_request(text, purpose);
        let response = self
            .client
            .post(self.embed_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .context("embedding request failed")?;
        let status = response.status();
        if !status.is_success() {
            let detail: String = response.text().unwrap_or_default().chars().take(200).collect();
            return Err(anyhow!("embedding API returned {status}: {detail}"));
        }
        let json: serde_json::Value = response.json().context("embedding response is not JSON")?;
        parse_response(json)
    }
}
