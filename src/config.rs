//! TOML configuration parsing and validation.
//!
//! Every section is optional; omitted sections fall back to the defaults
//! below. The `[vector_db]` section is the exception: without it no
//! persistent context store is created.
//!
//! ```toml
//! [staging]
//! ephemeral_dir = "cache/inference_context_upload_dir"
//! persistent_dir = "persistent/model_context/files"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 0
//!
//! [retrieval]
//! ephemeral_chunks = 4
//! persistent_chunks = 4
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [vector_db]
//! backend = "qdrant"
//! url = "http://localhost"
//! port = 6333
//! collection = "model_persistent_context"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use habit_context_core::chunk::{SplitParams, DEFAULT_SEPARATOR};

/// Upper bound for per-store retrieval counts.
pub const MAX_CONTEXT_CHUNKS: usize = 10;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_db: Option<VectorDbConfig>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub routines: RoutinesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StagingConfig {
    #[serde(default = "default_ephemeral_dir")]
    pub ephemeral_dir: PathBuf,
    #[serde(default = "default_persistent_dir")]
    pub persistent_dir: PathBuf,
    /// Files under the ephemeral directory picked up by `memorize`.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            ephemeral_dir: default_ephemeral_dir(),
            persistent_dir: default_persistent_dir(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_ephemeral_dir() -> PathBuf {
    PathBuf::from("cache/inference_context_upload_dir")
}
fn default_persistent_dir() -> PathBuf {
    PathBuf::from("persistent/model_context/files")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_overlap: usize,
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: 0,
            separator: default_separator(),
        }
    }
}

impl ChunkingConfig {
    pub fn split_params(&self) -> SplitParams {
        SplitParams {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            separator: self.separator.clone(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_context_chunks")]
    pub ephemeral_chunks: usize,
    #[serde(default = "default_context_chunks")]
    pub persistent_chunks: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            ephemeral_chunks: default_context_chunks(),
            persistent_chunks: default_context_chunks(),
        }
    }
}

fn default_context_chunks() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorDbConfig {
    /// `"qdrant"`, `"sqlite"`, or `"memory"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_db_url")]
    pub url: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Environment variable holding the Qdrant API key, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Database file for the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_db_url(),
            port: default_db_port(),
            collection: default_collection(),
            api_key_env: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
            path: None,
        }
    }
}

fn default_backend() -> String {
    "qdrant".to_string()
}
fn default_db_url() -> String {
    "http://localhost".to_string()
}
fn default_db_port() -> u16 {
    6333
}
fn default_collection() -> String {
    "model_persistent_context".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7862".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutinesConfig {
    #[serde(default = "default_routine")]
    pub active: String,
    #[serde(default = "default_routine_choices")]
    pub choices: Vec<String>,
}

impl Default for RoutinesConfig {
    fn default() -> Self {
        Self {
            active: default_routine(),
            choices: default_routine_choices(),
        }
    }
}

fn default_routine() -> String {
    "default".to_string()
}
fn default_routine_choices() -> Vec<String> {
    vec![default_routine()]
}

/// Read, parse, and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    for (name, value) in [
        ("retrieval.ephemeral_chunks", config.retrieval.ephemeral_chunks),
        ("retrieval.persistent_chunks", config.retrieval.persistent_chunks),
    ] {
        if value > MAX_CONTEXT_CHUNKS {
            bail!("{} must be between 0 and {}", name, MAX_CONTEXT_CHUNKS);
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" | "hash" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.unwrap_or(0) == 0 {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, openai, ollama, or hash.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    if let Some(db) = &config.vector_db {
        match db.backend.as_str() {
            "qdrant" | "memory" => {}
            "sqlite" => {
                if db.path.is_none() {
                    bail!("vector_db.path must be set when backend is 'sqlite'");
                }
            }
            other => bail!(
                "Unknown vector_db backend: '{}'. Must be qdrant, sqlite, or memory.",
                other
            ),
        }
        if db.collection.trim().is_empty() {
            bail!("vector_db.collection must not be empty");
        }
    }

    if !config.routines.choices.contains(&config.routines.active) {
        bail!(
            "routines.active '{}' is not one of routines.choices",
            config.routines.active
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 0);
        assert_eq!(config.retrieval.ephemeral_chunks, 4);
        assert_eq!(config.embedding.provider, "local");
        assert!(config.vector_db.is_none());
        assert_eq!(config.routines.active, "default");
    }

    #[test]
    fn test_vector_db_defaults() {
        let config = parse_config("[vector_db]\n").unwrap();
        let db = config.vector_db.unwrap();
        assert_eq!(db.backend, "qdrant");
        assert_eq!(db.port, 6333);
        assert_eq!(db.collection, "model_persistent_context");
    }

    #[test]
    fn test_rejects_bad_chunking() {
        assert!(parse_config("[chunking]\nchunk_size = 0\n").is_err());
        assert!(parse_config("[chunking]\nchunk_size = 10\nchunk_overlap = 10\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = parse_config("[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_remote_provider_needs_model_and_dims() {
        assert!(parse_config("[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(parse_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n"
        )
        .is_ok());
    }

    #[test]
    fn test_sqlite_backend_needs_path() {
        assert!(parse_config("[vector_db]\nbackend = \"sqlite\"\n").is_err());
        assert!(parse_config("[vector_db]\nbackend = \"sqlite\"\npath = \"ctx.sqlite\"\n").is_ok());
    }

    #[test]
    fn test_retrieval_bounds() {
        assert!(parse_config("[retrieval]\nephemeral_chunks = 11\n").is_err());
        assert!(parse_config("[retrieval]\npersistent_chunks = 0\n").is_ok());
    }

    #[test]
    fn test_active_routine_must_be_a_choice() {
        assert!(parse_config("[routines]\nactive = \"focus\"\n").is_err());
        assert!(
            parse_config("[routines]\nactive = \"focus\"\nchoices = [\"default\", \"focus\"]\n")
                .is_ok()
        );
    }
}
