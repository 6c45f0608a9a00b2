//! Retrieval service: build (load → chunk → embed → index + metadata → disk)
//! and retrieve (embed query → search → map rows to chunks).
//!
//! The index and its metadata are swapped in as one `Arc`, so a reader never
//! sees rows from one build paired with records from another. Only one build
//! runs at a time; a second concurrent call gets [`RagError::BuildInProgress`].
//! A build holds the state write lock for its whole run, so retrieves issued
//! meanwhile wait for it and then see the new corpus.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::app_data;
use crate::chunks::{chunk_documents, Chunk, ChunkParams};
use crate::config::Config;
use crate::documents::{load_documents, DEFAULT_EXTENSION};
use crate::embed::EmbeddingClient;
use crate::error::{PersistenceError, RagError};
use crate::metadata::MetadataStore;
use crate::store::VectorIndex;

/// Where to read documents from and where to keep the index pair.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Required for [`RagService::build`]; a query-only service may omit it.
    pub docs_folder: Option<PathBuf>,
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
    pub extensions: Vec<String>,
    pub chunk_params: ChunkParams,
}

impl ServiceSettings {
    /// Settings with the default extension and chunk parameters.
    pub fn new(docs_folder: Option<PathBuf>, index_path: PathBuf, metadata_path: PathBuf) -> Self {
        Self {
            docs_folder,
            index_path,
            metadata_path,
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            chunk_params: ChunkParams::default(),
        }
    }

    pub fn with_chunk_params(mut self, params: ChunkParams) -> Self {
        self.chunk_params = params;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, RagError> {
        config.validate()?;
        Ok(Self {
            docs_folder: config.docs_folder().ok(),
            index_path: config.index_path()?,
            metadata_path: config.metadata_path()?,
            extensions: config.extensions.clone(),
            chunk_params: config.chunk_params()?,
        })
    }
}

/// Outcome of a build. `chunks == 0` means nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
}

/// A retrieved chunk and its squared distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

#[derive(Debug)]
struct Corpus {
    index: VectorIndex,
    metadata: MetadataStore,
}

/// What the service currently serves from.
#[derive(Debug)]
enum State {
    Unbuilt,
    /// The persisted pair exists but failed to load; holds the reason until a
    /// build replaces it.
    Unreadable(String),
    Ready(Arc<Corpus>),
}

#[derive(Debug)]
pub struct RagService {
    settings: ServiceSettings,
    embedder: EmbeddingClient,
    state: RwLock<State>,
    build_lock: Mutex<()>,
}

impl RagService {
    /// Loads the persisted index pair if both files exist; otherwise starts unbuilt.
    ///
    /// A pair that exists but is corrupt or misaligned does not stop startup:
    /// the service comes up unbuilt, retrieves report the load failure as
    /// [`RagError::Persistence`], and the next build overwrites the pair.
    pub fn new(settings: ServiceSettings, embedder: EmbeddingClient) -> Result<Self, RagError> {
        let state = match load_pair(&settings.index_path, &settings.metadata_path) {
            Ok(Some(c)) => {
                info!(
                    rows = c.index.len(),
                    dim = c.index.dim(),
                    path = %settings.index_path.display(),
                    "loaded persisted index"
                );
                State::Ready(Arc::new(c))
            }
            Ok(None) => {
                info!(path = %settings.index_path.display(), "no persisted index; build required");
                State::Unbuilt
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %settings.index_path.display(),
                    "persisted index unusable; build required"
                );
                State::Unreadable(e.to_string())
            }
        };
        Ok(Self {
            settings,
            embedder,
            state: RwLock::new(state),
            build_lock: Mutex::new(()),
        })
    }

    /// Wire settings and the embedding provider from config.
    pub fn from_config(config: &Config) -> Result<Self, RagError> {
        let settings = ServiceSettings::from_config(config)?;
        let embedder = EmbeddingClient::from_config(&config.embedding)
            .map_err(|e| RagError::InvalidConfiguration(e.to_string()))?;
        Self::new(settings, embedder)
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    pub async fn is_built(&self) -> bool {
        matches!(*self.state.read().await, State::Ready(_))
    }

    /// Number of indexed chunks (0 when unbuilt).
    pub async fn len(&self) -> usize {
        match &*self.state.read().await {
            State::Ready(c) => c.index.len(),
            _ => 0,
        }
    }

    /// Rebuild the index from the docs folder and persist it.
    ///
    /// On any error the previous in-memory and on-disk index stay as they
    /// were. If the folder yields no chunks, nothing is written and the report
    /// says `chunks: 0`.
    pub async fn build(&self) -> Result<BuildReport, RagError> {
        let _guard = self
            .build_lock
            .try_lock()
            .map_err(|_| RagError::BuildInProgress)?;
        self.rebuild().await
    }

    /// Build only if nothing is loaded yet. Waits for an in-flight build
    /// instead of failing. Returns `None` when no build was needed.
    pub async fn ensure_built(&self) -> Result<Option<BuildReport>, RagError> {
        let _guard = self.build_lock.lock().await;
        if self.is_built().await {
            return Ok(None);
        }
        self.rebuild().await.map(Some)
    }

    async fn rebuild(&self) -> Result<BuildReport, RagError> {
        let folder = self.settings.docs_folder.as_deref().ok_or_else(|| {
            RagError::InvalidConfiguration("no docs folder configured".into())
        })?;
        let mut slot = self.state.write().await;

        info!(folder = %folder.display(), model = self.embedder.model_name(), "building index");
        let documents = load_documents(folder, &self.settings.extensions)?;
        let chunks = chunk_documents(&documents, self.settings.chunk_params);
        let report = BuildReport {
            documents: documents.len(),
            chunks: chunks.len(),
        };
        info!(documents = report.documents, chunks = report.chunks, "chunked documents");
        if chunks.is_empty() {
            warn!(folder = %folder.display(), "no chunks found; keeping the existing index");
            return Ok(report);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_corpus(&texts).await?;
        let corpus = Corpus {
            index: VectorIndex::build(vectors)?,
            metadata: MetadataStore::new(chunks),
        };
        persist_pair(&corpus, &self.settings.index_path, &self.settings.metadata_path)?;
        info!(
            rows = corpus.index.len(),
            dim = corpus.index.dim(),
            path = %self.settings.index_path.display(),
            "index built"
        );
        *slot = State::Ready(Arc::new(corpus));
        Ok(report)
    }

    /// The `top_k` chunks most similar to `query`, most similar first.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Chunk>, RagError> {
        Ok(self
            .retrieve_scored(query, top_k)
            .await?
            .into_iter()
            .map(|s| s.chunk)
            .collect())
    }

    /// Like [`RagService::retrieve`], with distances.
    pub async fn retrieve_scored(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, RagError> {
        let corpus = self.corpus().await?;
        let vector = self.embedder.embed_query(query).await?;
        let hits = corpus.index.search(&vector, top_k)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                corpus.metadata.get(hit.row).map(|chunk| ScoredChunk {
                    chunk: chunk.clone(),
                    distance: hit.distance,
                })
            })
            .collect())
    }

    async fn corpus(&self) -> Result<Arc<Corpus>, RagError> {
        match &*self.state.read().await {
            State::Ready(c) => Ok(c.clone()),
            State::Unbuilt => Err(RagError::NotBuilt),
            State::Unreadable(detail) => Err(PersistenceError::Unreadable {
                path: self.settings.index_path.clone(),
                detail: detail.clone(),
            }
            .into()),
        }
    }
}

/// Formats retrieved chunks as a grounding block for a generation prompt.
pub fn render_context(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for c in chunks {
        let _ = writeln!(out, "From {} (chunk {}):\n{}\n---", c.filename, c.chunk_id, c.text);
    }
    out
}

fn load_pair(index_path: &Path, metadata_path: &Path) -> Result<Option<Corpus>, PersistenceError> {
    if !index_path.exists() || !metadata_path.exists() {
        return Ok(None);
    }
    let index = VectorIndex::load(index_path)?;
    let metadata = MetadataStore::load(metadata_path)?;
    if index.len() != metadata.len() {
        return Err(PersistenceError::Misaligned {
            index: index.len(),
            metadata: metadata.len(),
        });
    }
    Ok(Some(Corpus { index, metadata }))
}

/// Stage both files before renaming either, so a failed write leaves the
/// previous pair in place.
fn persist_pair(corpus: &Corpus, index_path: &Path, metadata_path: &Path) -> Result<(), PersistenceError> {
    let index_tmp = app_data::staged_path(index_path);
    let metadata_tmp = app_data::staged_path(metadata_path);
    let staged = app_data::stage(&index_tmp, &corpus.index.to_bytes())
        .map_err(|e| PersistenceError::io(index_path, e))
        .and_then(|()| corpus.metadata.to_bytes(metadata_path))
        .and_then(|bytes| {
            app_data::stage(&metadata_tmp, &bytes).map_err(|e| PersistenceError::io(metadata_path, e))
        });
    if let Err(e) = staged {
        let _ = std::fs::remove_file(&index_tmp);
        let _ = std::fs::remove_file(&metadata_tmp);
        return Err(e);
    }
    std::fs::rename(&index_tmp, index_path).map_err(|e| PersistenceError::io(index_path, e))?;
    std::fs::rename(&metadata_tmp, metadata_path).map_err(|e| PersistenceError::io(metadata_path, e))
}
