//! Configuration loader and path helpers.
//!
//! Figment merges built-in defaults, `config.toml`, `config.<env>.toml` and
//! `APP_*` env vars (`APP_RETRIEVAL__TOP_K=5`) into a typed [`Settings`].
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    /// Build from an explicit provider chain; defaults are always layered first.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

/// Typed view over the merged configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub embedding: EmbeddingSettings,
    pub backfill: BackfillSettings,
    pub edgar: EdgarSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be > 0".into()));
        }
        if self.retrieval.over_fetch_factor == 0 {
            return Err(Error::InvalidConfig("retrieval.over_fetch_factor must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub filings_dir: String,
    pub index_dir: String,
    pub table: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            filings_dir: "data/filings".to_string(),
            index_dir: "data/index".to_string(),
            table: "passages".to_string(),
        }
    }
}

impl DataSettings {
    pub fn filings_dir(&self) -> PathBuf { expand_path(&self.filings_dir) }
    pub fn index_dir(&self) -> PathBuf { expand_path(&self.index_dir) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared by consecutive chunks.
    pub overlap: usize,
    /// Chunks whose text is not longer than this are dropped.
    pub min_chars: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 500, overlap: 50, min_chars: 50 }
    }
}

impl ChunkingSettings {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking requires 0 <= overlap < chunk_size (got chunk_size={}, overlap={})",
                self.chunk_size, self.overlap
            )));
        }
        Ok(())
    }

    pub fn step(&self) -> usize { self.chunk_size.saturating_sub(self.overlap).max(1) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub over_fetch_factor: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3, over_fetch_factor: 10 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { dim: 384 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillSettings {
    pub enabled: bool,
    pub fetch_count: usize,
    pub timeout_secs: u64,
    pub form_type: String,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self { enabled: true, fetch_count: 1, timeout_secs: 120, form_type: "10-K".to_string() }
    }
}

impl BackfillSettings {
    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgarSettings {
    /// SEC asks for "Company Name contact@domain" in the User-Agent.
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub pause_ms: u64,
}

impl Default for EdgarSettings {
    fn default() -> Self {
        Self {
            user_agent: "riskrag/0.1 (contact@example.com)".to_string(),
            request_timeout_secs: 30,
            pause_ms: 200,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
