//! File watcher for the docs folder. Signals when reference documents change.

use std::path::Path;
use std::time::Duration;

use notify_debouncer_mini::notify::{self, RecommendedWatcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tracing::{debug, warn};

use crate::documents::has_extension;

const DEBOUNCE: Duration = Duration::from_millis(400);

/// Keeps the watch alive; dropping it stops watching.
pub struct DocsWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
}

/// Watches `folder` and calls `on_change` (debounced) whenever a file with one
/// of `extensions` is created, modified or removed. The callback runs on the
/// watcher's own thread.
pub fn watch_docs(
    folder: &Path,
    extensions: &[String],
    on_change: impl Fn() + Send + 'static,
) -> Result<DocsWatcher, WatchError> {
    if !folder.is_dir() {
        return Err(WatchError::NotADirectory(folder.to_path_buf()));
    }
    let folder = folder.canonicalize().map_err(WatchError::Canonicalize)?;
    let extensions = extensions.to_vec();

    let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| match res {
        Ok(events) => {
            if events.iter().any(|e| has_extension(&e.path, &extensions)) {
                debug!(events = events.len(), "docs folder changed");
                on_change();
            }
        }
        Err(e) => warn!(error = %e, "watcher error"),
    })
    .map_err(|e| WatchError::Notify(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&folder, notify::RecursiveMode::NonRecursive)
        .map_err(|e| WatchError::Watch(e.to_string()))?;

    Ok(DocsWatcher {
        _debouncer: debouncer,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("not a directory: {0}")]
    NotADirectory(std::path::PathBuf),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("watcher init: {0}")]
    Notify(String),
    #[error("watch failed: {0}")]
    Watch(String),
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn rejects_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let res = watch_docs(&dir.path().join("nope"), &["txt".to_string()], || {});
        assert!(matches!(res, Err(WatchError::NotADirectory(_))));
    }

    #[test]
    fn fires_on_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        let _watcher = watch_docs(dir.path(), &["txt".to_string()], move || {
            let _ = tx.send(());
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(100));
        std::fs::write(dir.path().join("new.txt"), "hello").unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
