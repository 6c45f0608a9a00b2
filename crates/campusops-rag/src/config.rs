//! Persisted config (docs folder, index paths, chunking, embedding provider)
//! in the app data directory, with environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app_data;
use crate::chunks::{ChunkError, ChunkParams, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use crate::documents::DEFAULT_EXTENSION;
use crate::embed::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY, DEFAULT_TIMEOUT};
use crate::openai;

const CONFIG_FILENAME: &str = "config.toml";
const INDEX_FILENAME: &str = "index.bin";
const METADATA_FILENAME: &str = "metadata.json";

pub const ENV_DOCS_FOLDER: &str = "RAG_DOCS_FOLDER";
pub const ENV_INDEX_PATH: &str = "RAG_INDEX_PATH";
pub const ENV_METADATA_PATH: &str = "RAG_METADATA_PATH";
pub const ENV_EMBED_MODEL: &str = "RAG_EMBED_MODEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder of reference documents (chosen by the operator).
    pub docs_folder: Option<String>,
    /// Defaults to `index.bin` in the app data directory.
    pub index_path: Option<String>,
    /// Defaults to `metadata.json` in the app data directory.
    pub metadata_path: Option<String>,
    /// File extensions to load, without the dot.
    pub extensions: Vec<String>,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docs_folder: None,
            index_path: None,
            metadata_path: None,
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Any OpenAI-compatible `/embeddings` endpoint (Groq by default).
    #[default]
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: Provider,
    /// API root; each provider has its own default.
    pub base_url: Option<String>,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Texts per API call. 1 means one call per chunk.
    pub batch_size: usize,
    pub timeout_secs: u64,
    /// Retries per batch during a build. Queries are never retried.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            base_url: None,
            model: openai::DEFAULT_EMBED_MODEL.to_string(),
            api_key_env: openai::DEFAULT_API_KEY_ENV.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY.as_millis() as u64,
        }
    }
}

impl Config {
    /// Chunk parameters, validated.
    pub fn chunk_params(&self) -> Result<ChunkParams, ConfigError> {
        Ok(ChunkParams::new(self.chunking.chunk_size, self.chunking.overlap)?)
    }

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunk_params()?;
        if self.embedding.timeout_secs == 0 {
            return Err(ConfigError::Invalid("embedding.timeout_secs must be positive".into()));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid("extensions must not be empty".into()));
        }
        Ok(())
    }

    pub fn docs_folder(&self) -> Result<PathBuf, ConfigError> {
        self.docs_folder
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingDocsFolder)
    }

    pub fn index_path(&self) -> Result<PathBuf, ConfigError> {
        resolve_or_default(self.index_path.as_deref(), INDEX_FILENAME)
    }

    pub fn metadata_path(&self) -> Result<PathBuf, ConfigError> {
        resolve_or_default(self.metadata_path.as_deref(), METADATA_FILENAME)
    }

    /// Overlay values from `lookup` (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = get(ENV_DOCS_FOLDER) {
            self.docs_folder = Some(v);
        }
        if let Some(v) = get(ENV_INDEX_PATH) {
            self.index_path = Some(v);
        }
        if let Some(v) = get(ENV_METADATA_PATH) {
            self.metadata_path = Some(v);
        }
        if let Some(v) = get(ENV_EMBED_MODEL) {
            self.embedding.model = v;
        }
    }
}

fn resolve_or_default(configured: Option<&str>, filename: &str) -> Result<PathBuf, ConfigError> {
    match configured.filter(|s| !s.is_empty()) {
        Some(p) => Ok(PathBuf::from(p)),
        None => Ok(app_data::app_data_dir()
            .ok_or(ConfigError::NoDataDir)?
            .join(filename)),
    }
}

/// Path of the config file in the app data directory.
pub fn config_path() -> Option<PathBuf> {
    app_data::app_data_dir().map(|d| d.join(CONFIG_FILENAME))
}

/// Load config from the app data directory, then apply environment overrides.
/// A missing or unreadable file gives the default config.
pub fn load_config() -> Config {
    let mut config = config_path()
        .filter(|p| p.exists())
        .and_then(|p| match load_config_file(&p) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(error = %e, "ignoring config file");
                None
            }
        })
        .unwrap_or_default();
    config.apply_overrides(|k| std::env::var(k).ok());
    config
}

/// Load an explicitly chosen config file, then apply environment overrides.
/// Unlike [`load_config`], a missing or invalid file is an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let mut config = load_config_file(path)?;
    config.apply_overrides(|k| std::env::var(k).ok());
    Ok(config)
}

fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&s).map_err(ConfigError::Parse)
}

/// Save config to `path`, or to the app data directory when `None`.
pub fn save_config(config: &Config, path: Option<&Path>) -> Result<(), ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path().ok_or(ConfigError::NoDataDir)?,
    };
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    app_data::write_atomic(&path, s.as_bytes()).map_err(ConfigError::Write)
}

/// Set and persist the docs folder.
pub fn set_docs_folder(path: &Path, config_file: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = path.canonicalize().map_err(ConfigError::Canonicalize)?;
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory(path));
    }
    let mut config = match config_file {
        Some(f) if f.exists() => load_config_file(f)?,
        Some(_) => Config::default(),
        None => config_path()
            .filter(|p| p.exists())
            .map(|p| load_config_file(&p))
            .transpose()?
            .unwrap_or_default(),
    };
    config.docs_folder = Some(path.to_string_lossy().into_owned());
    save_config(&config, config_file)?;
    Ok(path)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("no docs folder configured (set docs_folder or RAG_DOCS_FOLDER)")]
    MissingDocsFolder,
    #[error(transparent)]
    Chunking(#[from] ChunkError),
    #[error("{0}")]
    Invalid(String),
}
