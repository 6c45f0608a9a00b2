//! Retrieval core for CampusOps: turns a folder of reference documents into a
//! persisted vector index and serves nearest-neighbor lookups that ground
//! generation prompts.
//!
//! Pipeline: [documents] → [chunks] → [embed] → [store] + [metadata], driven by
//! [service::RagService]. HTTP routes and report generation live elsewhere and
//! only call [`RagService::build`] and [`RagService::retrieve`].

pub mod app_data;
pub mod chunks;
pub mod config;
pub mod documents;
pub mod embed;
pub mod error;
pub mod metadata;
pub mod ollama;
pub mod openai;
pub mod service;
pub mod store;
pub mod watcher;

pub use app_data::app_data_dir;
pub use chunks::{chunk_document, chunk_documents, split_words, Chunk, ChunkError, ChunkParams};
pub use config::{load_config, load_config_from, save_config, set_docs_folder, Config, ConfigError};
pub use documents::{load_documents, Document, LoadError};
pub use embed::{EmbedError, Embedder, EmbeddingClient, RetryPolicy};
pub use error::{PersistenceError, RagError};
pub use metadata::MetadataStore;
pub use service::{render_context, BuildReport, RagService, ScoredChunk, ServiceSettings};
pub use store::{Hit, IndexError, VectorIndex};
pub use watcher::{watch_docs, DocsWatcher, WatchError};
