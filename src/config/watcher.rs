//! Configuration file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Config watcher that monitors file changes and sends reload notifications
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Create a new config watcher for the specified file
    ///
    /// The parent directory is watched so the file may be created or
    /// replaced (as most editors do) after startup.
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();
        let (tx, rx) = mpsc::channel(10);

        let watch_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = config_path.file_name().map(|n| n.to_os_string());

        // notify callbacks run on their own OS thread, not in Tokio context
        let runtime_handle = tokio::runtime::Handle::current();
        let config_path_clone = config_path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !touches_config {
                        return;
                    }
                    debug!("Config file modified: {:?}", event.paths);

                    let config_path = config_path_clone.clone();
                    let tx = tx.clone();

                    runtime_handle.spawn(async move {
                        // Debounce: wait a bit for file writes to complete
                        tokio::time::sleep(Duration::from_millis(100)).await;

                        match AppConfig::load(&config_path).await {
                            Ok(new_config) => {
                                info!("Configuration reloaded successfully");
                                if let Err(e) = tx.send(new_config).await {
                                    error!("Failed to send config update: {}", e);
                                }
                            }
                            Err(e) => {
                                warn!("Failed to reload config (keeping old config): {:#}", e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", watch_dir.display()))?;

        info!("Config file watcher started for: {}", config_path.display());

        Ok(Self { _watcher: watcher, rx })
    }

    /// Wait for the next config update
    /// Returns None if the watcher has been closed
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_watcher_basic() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("test-config.yaml");

        fs::write(&config_path, "poll_interval_ms: 100\n")?;
        let config = AppConfig::load(&config_path).await?;
        assert_eq!(config.poll_interval_ms, 100);

        let mut watcher = ConfigWatcher::new(config_path.clone())?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, "poll_interval_ms: 250\nled:\n  idle:\n    colour: 3\n")?;

        let new_config = tokio::time::timeout(Duration::from_secs(2), watcher.next_config()).await?;

        let new_config = new_config.expect("watcher closed without a reload");
        assert_eq!(new_config.poll_interval_ms, 250);
        assert_eq!(new_config.led.idle.colour, 3);

        Ok(())
    }
}
