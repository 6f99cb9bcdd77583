//! TOML configuration.
//!
//! Only `[db]` is required. Provider API keys are never read from the file;
//! each provider section names the environment variable that holds its key
//! (`OPENAI_API_KEY` by default). A missing key is not an error: the
//! provider runs in degraded mode.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity for a vector match.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Score assigned to keyword matches.
    #[serde(default = "default_keyword_score")]
    pub keyword_score: f64,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_chat_chunk_limit")]
    pub chat_chunk_limit: usize,
    #[serde(default = "default_insight_chunk_limit")]
    pub insight_chunk_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            keyword_score: default_keyword_score(),
            default_limit: default_limit(),
            chat_chunk_limit: default_chat_chunk_limit(),
            insight_chunk_limit: default_insight_chunk_limit(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_keyword_score() -> f64 {
    0.8
}
fn default_limit() -> usize {
    5
}
fn default_chat_chunk_limit() -> usize {
    2
}
fn default_insight_chunk_limit() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_insight_max_tokens")]
    pub insight_max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_chat_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_tokens: default_chat_max_tokens(),
            insight_max_tokens: default_insight_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_chat_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl ChatConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_chat_timeout() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    1
}
fn default_chat_max_tokens() -> u32 {
    800
}
fn default_insight_max_tokens() -> u32 {
    1000
}
fn default_temperature() -> f64 {
    0.7
}

impl Config {
    /// Configuration with defaults everywhere except the database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            chat: ChatConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            anyhow::bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&self.retrieval.keyword_score) {
            anyhow::bail!("retrieval.keyword_score must be in [0.0, 1.0]");
        }
        if self.retrieval.default_limit == 0 {
            anyhow::bail!("retrieval.default_limit must be >= 1");
        }
        if self.embedding.dims == 0 {
            anyhow::bail!("embedding.dims must be > 0");
        }
        match self.embedding.provider.as_str() {
            "disabled" | "openai" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled or openai.",
                other
            ),
        }
        match self.chat.provider.as_str() {
            "disabled" | "openai" => {}
            other => anyhow::bail!(
                "Unknown chat provider: '{}'. Must be disabled or openai.",
                other
            ),
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            anyhow::bail!("chat.temperature must be in [0.0, 2.0]");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
