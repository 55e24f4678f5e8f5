// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for ragdex
//!
//! Loads configuration from .ragdexrc.toml in current directory or ~/.config/ragdex/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::embedding::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_SOURCE_BYTES};
use crate::embedding::ChunkConfig;
use crate::errors::Result;
use crate::utils::DEFAULT_SNAPSHOT_PATH;

/// Output format for results (mirrored from cli for library use)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOutputFormat {
    #[default]
    Text,
    Json,
}

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Local fastembed model
    #[default]
    Builtin,
    Command,
    Hashing,
}

/// Chunking configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Number of characters per passage
    pub size: Option<usize>,
    /// Number of characters shared by consecutive passages
    pub overlap: Option<usize>,
    /// Maximum source size in bytes to chunk
    pub max_source_bytes: Option<usize>,
}

impl ChunkingConfig {
    /// Get chunk size (defaults to 500)
    pub fn size(&self) -> usize {
        self.size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Get chunk overlap (defaults to 50)
    pub fn overlap(&self) -> usize {
        self.overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP)
    }

    /// Get max source bytes (defaults to 20MB)
    pub fn max_source_bytes(&self) -> usize {
        self.max_source_bytes.unwrap_or(DEFAULT_MAX_SOURCE_BYTES)
    }

    /// Build a validated chunk configuration
    pub fn chunk_config(&self) -> Result<ChunkConfig> {
        Ok(ChunkConfig::new(self.size(), self.overlap())?
            .with_max_source_bytes(self.max_source_bytes()))
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, hashing)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Vector width for the hashing provider
    pub dimension: Option<usize>,
    /// Passages per provider call (command and builtin providers)
    pub batch_size: Option<usize>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "minilm")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("minilm")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get hashing dimension (defaults to 64)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(64)
    }
}

/// Snapshot configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Path of the snapshot file
    pub snapshot: Option<PathBuf>,
    /// Save the snapshot after every successful ingest
    pub persist_ingest: Option<bool>,
}

impl IndexConfig {
    /// Get snapshot path (defaults to .ragdex/snapshot.sqlite)
    pub fn snapshot(&self) -> &Path {
        self.snapshot
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_SNAPSHOT_PATH))
    }

    /// Get persist-on-ingest (defaults to true)
    pub fn persist_ingest(&self) -> bool {
        self.persist_ingest.unwrap_or(true)
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of passages handed to the generation service
    pub top_k: Option<usize>,
}

impl RetrievalConfig {
    /// Get top k (defaults to 3)
    pub fn top_k(&self) -> usize {
        self.top_k.unwrap_or(3)
    }
}

/// Generation service configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Endpoint of the generate API
    pub url: Option<String>,
    /// Model name passed to the service
    pub model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Name the assistant answers as
    pub assistant_name: Option<String>,
}

impl GenerationConfig {
    /// Get url (defaults to the local Ollama generate endpoint)
    pub fn url(&self) -> &str {
        self.url
            .as_deref()
            .unwrap_or("http://localhost:11434/api/generate")
    }

    /// Get model (defaults to "gemma:2b")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("gemma:2b")
    }

    /// Get timeout (defaults to 120 seconds)
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(120))
    }

    /// Get assistant name (defaults to "Doozy")
    pub fn assistant_name(&self) -> &str {
        self.assistant_name.as_deref().unwrap_or("Doozy")
    }
}

/// Configuration loaded from .ragdexrc.toml or ~/.config/ragdex/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: Option<ConfigOutputFormat>,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Snapshot configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Generation service configuration
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .ragdexrc.toml in current directory
    /// 2. ~/.config/ragdex/config.toml
    pub fn load() -> Self {
        // Try current directory first
        if let Some(config) = Self::load_from_path(Path::new(".ragdexrc.toml")) {
            return config;
        }

        // Try home directory config
        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("ragdex").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge CLI top-k with config (CLI wins)
    pub fn merge_top_k(&self, cli_value: Option<usize>) -> usize {
        cli_value.unwrap_or_else(|| self.retrieval.top_k())
    }

    /// Merge CLI snapshot path with config (CLI wins)
    pub fn merge_snapshot(&self, cli_value: Option<&Path>) -> PathBuf {
        cli_value
            .unwrap_or_else(|| self.index.snapshot())
            .to_path_buf()
    }

    /// Get the chunking configuration
    pub fn chunking(&self) -> &ChunkingConfig {
        &self.chunking
    }

    /// Get the embedding configuration
    pub fn embeddings(&self) -> &EmbeddingConfig {
        &self.embeddings
    }

    /// Get the snapshot configuration
    pub fn index(&self) -> &IndexConfig {
        &self.index
    }

    /// Get the generation configuration
    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.chunking().size(), 500);
        assert_eq!(config.chunking().overlap(), 50);
        assert_eq!(config.embeddings().provider(), EmbeddingProviderType::Builtin);
        assert_eq!(config.index().snapshot(), Path::new(".ragdex/snapshot.sqlite"));
        assert!(config.index().persist_ingest());
        assert_eq!(config.merge_top_k(None), 3);
        assert_eq!(config.generation().model(), "gemma:2b");
        assert_eq!(config.generation().timeout(), Duration::from_secs(120));
    }

    #[test]
    fn parses_sections_from_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_format = "json"

[chunking]
size = 5
overlap = 0

[embeddings]
provider = "hashing"
dimension = 32
batch_size = 16

[index]
snapshot = "data/index.sqlite"

[retrieval]
top_k = 7

[generation]
model = "llama3"
assistant_name = "Ada"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.default_format, Some(ConfigOutputFormat::Json));
        assert_eq!(config.chunking().chunk_config().unwrap().chunk_size, 5);
        assert_eq!(config.embeddings().provider(), EmbeddingProviderType::Hashing);
        assert_eq!(config.embeddings().dimension(), 32);
        assert_eq!(config.embeddings().batch_size, Some(16));
        assert_eq!(config.index().snapshot(), Path::new("data/index.sqlite"));
        assert_eq!(config.merge_top_k(None), 7);
        assert_eq!(config.merge_top_k(Some(1)), 1);
        assert_eq!(config.generation().model(), "llama3");
        assert_eq!(config.generation().assistant_name(), "Ada");
    }

    #[test]
    fn invalid_chunking_is_reported() {
        let chunking = ChunkingConfig {
            size: Some(10),
            overlap: Some(10),
            max_source_bytes: None,
        };
        assert!(chunking.chunk_config().is_err());
    }

    #[test]
    fn unparsable_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "chunking = [").unwrap();
        assert!(Config::load_from_path(&path).is_none());
    }

    #[test]
    fn cli_snapshot_overrides_config() {
        let config = Config::default();
        assert_eq!(
            config.merge_snapshot(Some(Path::new("/tmp/x.sqlite"))),
            PathBuf::from("/tmp/x.sqlite")
        );
    }
}
