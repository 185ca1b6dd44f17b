//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Nested keys come from double underscores, so `APP_CACHE__DIR` sets
//! `cache.dir`. Provides helpers to expand `~` and `${VAR}` and to resolve
//! relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Wrap an already assembled figment (tests, embedding applications).
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[cache]` section, falling back to defaults when it is absent.
    pub fn cache_settings(&self) -> anyhow::Result<CacheSettings> {
        let settings = if self.figment.find_value("cache").is_ok() {
            self.get::<CacheSettings>("cache")?
        } else {
            CacheSettings::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env_name: &str) -> anyhow::Result<()> {
        match env_name {
            "prod" | "production" => {
                // Production never runs on the fake embedder.
                let fake = env::var("APP_USE_FAKE_EMBEDDINGS")
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false);
                if fake {
                    anyhow::bail!("APP_USE_FAKE_EMBEDDINGS must not be set in production");
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

/// Settings for the semantic cache. Every field has a default so a missing
/// config file still yields a usable cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSettings {
    #[serde(default = "default_dir")]
    pub dir: String,
    #[serde(default = "default_index_file")]
    pub index_file: String,
    #[serde(default = "default_mapping_file")]
    pub mapping_file: String,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_base_url")]
    pub embedding_base_url: String,
    #[serde(default = "default_embedding_timeout_secs")]
    pub embedding_timeout_secs: u64,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub live_search_command: Option<Vec<String>>,
}

fn default_dir() -> String {
    "search_cache".to_string()
}

fn default_index_file() -> String {
    "semantic_index.idx".to_string()
}

fn default_mapping_file() -> String {
    "semantic_mapping.json".to_string()
}

fn default_similarity_threshold() -> f32 {
    0.96
}

fn default_embedding_dim() -> usize {
    768
}

fn default_embedding_model() -> String {
    "models/embedding-001".to_string()
}

fn default_embedding_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            index_file: default_index_file(),
            mapping_file: default_mapping_file(),
            similarity_threshold: default_similarity_threshold(),
            embedding_dim: default_embedding_dim(),
            embedding_model: default_embedding_model(),
            embedding_base_url: default_embedding_base_url(),
            embedding_timeout_secs: default_embedding_timeout_secs(),
            gemini_api_key: None,
            live_search_command: None,
        }
    }
}

impl CacheSettings {
    /// Settings rooted at `dir`, everything else default.
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_string_lossy().into_owned(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        let threshold = self.similarity_threshold;
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidConfig(format!(
                "similarity_threshold must be within [-1, 1], got {}",
                threshold
            )));
        }
        if self.embedding_dim == 0 {
            return Err(Error::InvalidConfig("embedding_dim must be positive".to_string()));
        }
        if self.dir.trim().is_empty() {
            return Err(Error::InvalidConfig("cache dir must not be empty".to_string()));
        }
        let files = [("index_file", &self.index_file), ("mapping_file", &self.mapping_file)];
        for (name, file) in files {
            if file.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        if self.index_file == self.mapping_file {
            return Err(Error::InvalidConfig("index_file and mapping_file must differ".to_string()));
        }
        if let Some(cmd) = &self.live_search_command {
            if cmd.first().map_or(true, |p| p.trim().is_empty()) {
                return Err(Error::InvalidConfig("live_search_command needs a program".to_string()));
            }
        }
        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        let base = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        resolve_with_base(&base, &self.dir)
    }

    pub fn index_path(&self) -> PathBuf {
        self.cache_dir().join(&self.index_file)
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.cache_dir().join(&self.mapping_file)
    }

    /// API key from the settings, or `GEMINI_API_KEY` from the environment.
    pub fn api_key(&self) -> Option<String> {
        self.gemini_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty()))
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
