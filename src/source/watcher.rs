//! Document file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Watches the document file and signals when it may have changed.
///
/// The receiver side calls `Manager::reload`, which re-reads the source and
/// ignores content the manager itself just wrote.
pub struct SourceWatcher {
    path: PathBuf,
    change_tx: mpsc::UnboundedSender<()>,
}

impl SourceWatcher {
    /// Create a new watcher for `path`.
    ///
    /// Returns the watcher and a receiver that yields once per detected change.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Another handle on the change channel, for reload requests that do not
    /// come from the filesystem.
    pub fn sender(&self) -> mpsc::UnboundedSender<()> {
        self.change_tx.clone()
    }

    /// Start watching in a background thread. Dropping the returned watcher
    /// stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();
        let target = self.path.clone();
        let file_name = target.file_name().map(|name| name.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    // The parent directory is watched so atomic renames are seen.
                    let relevant = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant {
                        tracing::debug!(path = ?target, "Document change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Document watcher started");
        Ok(watcher)
    }
}
