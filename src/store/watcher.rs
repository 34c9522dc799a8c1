//! Database file watcher for reload on external edits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::store::SharedStore;

/// Watches the backing file and reloads the store when it changes.
pub struct DbWatcher {
    path: PathBuf,
    store: SharedStore,
}

impl DbWatcher {
    pub fn new(path: &Path, store: SharedStore) -> Self {
        Self {
            path: path.to_path_buf(),
            store,
        }
    }

    /// Start watching. The returned watcher must be kept alive for events to flow.
    pub fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<RecommendedWatcher, notify::Error> {
        let (change_tx, mut change_rx) = mpsc::unbounded_channel();
        let file_name = self.path.file_name().map(ToOwned::to_owned);

        // Writes land through a rename, so watch the directory rather than the inode.
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(ToOwned::to_owned) == file_name);
                    if ours && (event.kind.is_modify() || event.kind.is_create()) {
                        let _ = change_tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Database watcher started");

        let store = self.store;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    event = change_rx.recv() => {
                        if event.is_none() {
                            break;
                        }
                        match store.reload().await {
                            Ok(true) => tracing::info!("Database file changed, reloaded"),
                            Ok(false) => {}
                            Err(e) => tracing::error!(
                                "Failed to reload database: {}. Keeping current contents.",
                                e
                            ),
                        }
                    }
                }
            }
            tracing::debug!("Database watcher stopped");
        });

        Ok(watcher)
    }
}
