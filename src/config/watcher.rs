//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched rather than the file itself so that
//! editors which save by rename keep triggering reloads.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::KitConfig;

/// Reloads a config file on change and forwards every valid, changed config.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<KitConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of its updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<KitConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned handle must be kept alive for updates to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.path.file_name().map(|name| name.to_os_string());
        let path = self.path.clone();
        let tx = self.update_tx;
        let last = Mutex::new(load_config(&path).ok());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                if !event.paths.iter().any(|p| p.file_name() == file_name.as_deref()) {
                    return;
                }

                let config = match load_config(&path) {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::error!(path = ?path, error = %e, "Config reload failed, keeping current configuration");
                        return;
                    }
                };

                let mut last = match last.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if last.as_ref() == Some(&config) {
                    return;
                }
                tracing::info!(path = ?path, "Config file changed");
                *last = Some(config.clone());
                let _ = tx.send(config);
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reload_forwards_changed_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kit.toml");
        std::fs::write(&path, "[timeouts]\nrequest_secs = 10\n").unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();

        std::fs::write(&path, "[timeouts]\nrequest_secs = 20\n").unwrap();
        let config = tokio::time::timeout(Duration::from_secs(10), updates.recv())
            .await
            .expect("no reload observed")
            .unwrap();
        assert_eq!(config.timeouts.request_secs, 20);
    }

    #[tokio::test]
    async fn test_invalid_file_is_not_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kit.toml");
        std::fs::write(&path, "").unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();

        std::fs::write(&path, "[timeouts]\nrequest_secs = 0\n").unwrap();
        let received = tokio::time::timeout(Duration::from_millis(500), updates.recv()).await;
        assert!(received.is_err());
    }
}
