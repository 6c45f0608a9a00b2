//! Errors surfaced by the retrieval façade, plus the persistence error shared
//! by the index and metadata files.

use std::path::PathBuf;

use crate::chunks::ChunkError;
use crate::config::ConfigError;
use crate::documents::LoadError;
use crate::embed::EmbedError;
use crate::store::IndexError;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("failed to load documents: {0}")]
    Io(#[from] LoadError),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("embedding service error: {0}")]
    RemoteService(#[from] EmbedError),
    #[error("index not built; run build first")]
    NotBuilt,
    #[error("a build is already in progress")]
    BuildInProgress,
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

impl From<ChunkError> for RagError {
    fn from(e: ChunkError) -> Self {
        RagError::InvalidConfiguration(e.to_string())
    }
}

impl From<ConfigError> for RagError {
    fn from(e: ConfigError) -> Self {
        RagError::InvalidConfiguration(e.to_string())
    }
}

/// Reading or writing the on-disk index/metadata pair.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("corrupt file {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },
    #[error("metadata encoding error on {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("index has {index} rows but metadata has {metadata} records")]
    Misaligned { index: usize, metadata: usize },
    #[error("persisted index at {path} could not be loaded ({detail}); rebuild required")]
    Unreadable { path: PathBuf, detail: String },
}

impl PersistenceError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(path: &std::path::Path, detail: impl Into<String>) -> Self {
        PersistenceError::Corrupt {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}
