//! Row-aligned chunk records persisted next to the vector index.
//! Record `i` describes the chunk that produced index row `i`.

use std::path::Path;

use crate::app_data;
use crate::chunks::Chunk;
use crate::error::PersistenceError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStore {
    records: Vec<Chunk>,
}

impl MetadataStore {
    pub fn new(records: Vec<Chunk>) -> Self {
        Self { records }
    }

    pub fn get(&self, row: usize) -> Option<&Chunk> {
        self.records.get(row)
    }

    pub fn records(&self) -> &[Chunk] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write records as a JSON array, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        app_data::write_atomic(path, &self.to_bytes(path)?).map_err(|e| PersistenceError::io(path, e))
    }

    pub(crate) fn to_bytes(&self, path: &Path) -> Result<Vec<u8>, PersistenceError> {
        serde_json::to_vec(&self.records).map_err(|source| PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read records written by [`MetadataStore::save`], in the same order.
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let bytes = std::fs::read(path).map_err(|e| PersistenceError::io(path, e))?;
        let records = serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { records })
    }
}
