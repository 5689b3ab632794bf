//! Journal directory watcher.
//!
//! Wraps a notify watcher and forwards create/modify events for
//! `Journal.*.log` files onto a channel. Exactly one ingestion worker
//! consumes the channel, which keeps all store writes on a single logical
//! stream. Dropping the watcher tears the subscription down; the worker
//! finishes whatever file it is on.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("journal directory not found: {0}")]
    MissingDirectory(PathBuf),
    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// A change notification from the journal directory.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryEvent {
    FileChanged(PathBuf),
    Error(String),
}

/// Whether a path looks like a game journal file.
pub fn is_journal_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with("Journal.") && name.ends_with(".log"))
}

pub struct DirectoryWatcher {
    // Held only so the notify subscription stays alive.
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<DirectoryEvent>,
}

impl DirectoryWatcher {
    pub fn new(dir: &Path) -> Result<Self, WatchError> {
        if !dir.is_dir() {
            return Err(WatchError::MissingDirectory(dir.to_path_buf()));
        }

        let (tx, rx) = mpsc::channel(256);
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    for path in event.paths {
                        if is_journal_file(&path) {
                            // The callback runs on notify's own thread.
                            let _ = tx.blocking_send(DirectoryEvent::FileChanged(path));
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.blocking_send(DirectoryEvent::Error(e.to_string()));
                }
            })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        tracing::info!(directory = %dir.display(), "watching journal directory");
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Next change notification; `None` once the watcher is torn down.
    pub async fn next_event(&mut self) -> Option<DirectoryEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_file_pattern() {
        assert!(is_journal_file(Path::new(
            "/logs/Journal.2025-05-01T120000.01.log"
        )));
        assert!(!is_journal_file(Path::new("/logs/Status.json")));
        assert!(!is_journal_file(Path::new("/logs/Journal.backup")));
        assert!(!is_journal_file(Path::new("/logs/notes.log")));
    }
}
