//! Configuration loading and validation for the Clearpath core.
//!
//! Multi-format dispatch by file extension (TOML, JSON, YAML) plus
//! `CLEARPATH_`-prefixed environment overrides, with a `validate()` pass for
//! the invariants the rest of the core relies on.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    64
}
fn default_top_k() -> usize {
    5
}
fn default_threshold() -> f32 {
    0.35
}
fn default_embedding_dim() -> usize {
    384
}
fn default_simple_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_complex_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_rate_limit_query_per_minute() -> u32 {
    30
}
fn default_rate_limit_ingest_per_minute() -> u32 {
    5
}
fn default_max_upload_size_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_groq_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

/// All recognized configuration keys for the Clearpath core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the upstream generation service.
    pub groq_api_key: String,

    #[serde(default = "default_groq_base_url")]
    pub groq_base_url: String,

    /// Directory holding the persisted vector index pair (`index.faiss`, `index.pkl`).
    pub index_dir: String,

    /// Directory scanned by the batch-ingestion tool for `*.pdf` files.
    pub pdf_dir: String,

    /// Path to the append-only structured query log.
    pub log_file_path: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    #[serde(default = "default_simple_model")]
    pub simple_model: String,

    #[serde(default = "default_complex_model")]
    pub complex_model: String,

    /// Enforced externally; the core only enumerates this key.
    #[serde(default = "default_rate_limit_query_per_minute")]
    pub rate_limit_query_per_minute: u32,

    /// Enforced externally; the core only enumerates this key.
    #[serde(default = "default_rate_limit_ingest_per_minute")]
    pub rate_limit_ingest_per_minute: u32,

    /// Enforced externally; the core only enumerates this key.
    #[serde(default = "default_max_upload_size_bytes")]
    pub max_upload_size_bytes: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML, JSON, or YAML file, selected by extension,
    /// with `CLEARPATH_`-prefixed environment variables overriding file values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let builder = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("CLEARPATH").separator("__"));

        let settings = builder
            .build()
            .map_err(|e| CoreError::Config(format!("failed to load config: {e}")))?;

        let parsed: AppConfig = settings
            .try_deserialize()
            .map_err(|e| CoreError::Config(format!("failed to parse config: {e}")))?;

        parsed.validate()?;
        Ok(parsed)
    }

    /// Validate invariants the rest of the core relies on.
    pub fn validate(&self) -> Result<()> {
        if self.groq_api_key.trim().is_empty() {
            return Err(CoreError::Config("groq_api_key must not be empty".into()));
        }
        if self.embedding_dim != 384 {
            return Err(CoreError::Config(format!(
                "embedding_dim must be 384, got {}",
                self.embedding_dim
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(CoreError::Config(
                "similarity_threshold must be in [0, 1]".into(),
            ));
        }
        if self.top_k == 0 {
            return Err(CoreError::Config("top_k must be > 0".into()));
        }
        if self.chunk_size == 0 {
            return Err(CoreError::Config("chunk_size must be > 0".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(CoreError::Config(
                "chunk_overlap must be smaller than chunk_size".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            groq_api_key: "test-key".into(),
            groq_base_url: default_groq_base_url(),
            index_dir: "data/index".into(),
            pdf_dir: "data/pdfs".into(),
            log_file_path: "data/logs/queries.jsonl".into(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            similarity_threshold: default_threshold(),
            embedding_dim: default_embedding_dim(),
            simple_model: default_simple_model(),
            complex_model: default_complex_model(),
            rate_limit_query_per_minute: default_rate_limit_query_per_minute(),
            rate_limit_ingest_per_minute: default_rate_limit_ingest_per_minute(),
            max_upload_size_bytes: default_max_upload_size_bytes(),
            log_level: default_log_level(),
            host: default_host(),
            port: default_port(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn empty_api_key_fails() {
        let mut cfg = sample();
        cfg.groq_api_key = "".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn wrong_embedding_dim_fails() {
        let mut cfg = sample();
        cfg.embedding_dim = 256;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overlap_not_smaller_than_chunk_size_fails() {
        let mut cfg = sample();
        cfg.chunk_overlap = cfg.chunk_size;
        assert!(cfg.validate().is_err());
    }
}
