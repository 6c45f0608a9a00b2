//! Discovering and reading reference documents from an operator-chosen folder.
//!
//! Only top-level files with a configured extension are read. Text is
//! whitespace-normalized on the way in; nothing else is transformed.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

/// Extension used when none is configured.
pub const DEFAULT_EXTENSION: &str = "txt";

/// One reference document: its file name and whitespace-normalized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub filename: String,
    pub text: String,
}

/// Reads every top-level file in `folder` whose extension is in `extensions`
/// (case-insensitive). Hidden entries are skipped. Documents come back sorted
/// by file name so repeated builds see the same order.
///
/// An empty folder is not an error; it yields an empty list.
pub fn load_documents(folder: &Path, extensions: &[String]) -> Result<Vec<Document>, LoadError> {
    if !folder.is_dir() {
        return Err(LoadError::NotADirectory(folder.to_path_buf()));
    }
    let mut documents = Vec::new();
    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| LoadError::Walk(e.to_string()))?;
        let path = entry.path();
        if !has_extension(path, extensions) {
            continue;
        }
        // Links are resolved only once the name matches.
        let target = std::fs::metadata(path).map_err(|e| LoadError::Read(path.to_path_buf(), e))?;
        if !target.is_file() {
            continue;
        }
        let raw = std::fs::read_to_string(path).map_err(|e| LoadError::Read(path.to_path_buf(), e))?;
        let filename = entry.file_name().to_string_lossy().into_owned();
        debug!(file = %filename, bytes = raw.len(), "loaded document");
        documents.push(Document {
            filename,
            text: normalize_whitespace(&raw),
        });
    }
    Ok(documents)
}

/// True if `path` ends in one of `extensions`, ignoring ASCII case.
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

/// Collapses every whitespace run (newlines included) to a single space and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("walk error: {0}")]
    Walk(String),
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
}
