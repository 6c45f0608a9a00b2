//! Where the retrieval core keeps its own data (config, index, metadata).
//!
//! Reference documents stay in the folder the operator chooses. Only derived
//! state is written here.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Returns the directory where config, index and metadata live by default.
/// On Linux: `~/.local/share/campusops/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("org", "CampusOps", "campusops")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Writes `bytes` to a sibling temp file and renames it over `path`, so readers
/// never see a half-written file. Parent directories are created as needed.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = staged_path(path);
    stage(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

/// Temp-file name used while `path` is being replaced.
pub(crate) fn staged_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes and syncs `bytes` at `tmp`; the caller renames it into place.
pub(crate) fn stage(tmp: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = tmp.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_is_some() {
        assert!(app_data_dir().is_some());
    }

    #[test]
    fn write_atomic_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.bin");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!staged_path(&path).exists());
    }
}
