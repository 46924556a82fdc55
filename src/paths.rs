//! Application path management for portable and installed modes.
//!
//! - **Portable mode**: a `.portable` marker next to the executable keeps
//!   the config and logs beside it.
//! - **Installed mode** (default): the config lives in
//!   `~/.config/knob-gw/config.yaml` (`dirs::config_dir()`), logs in the
//!   platform data directory.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "knob-gw";

/// Application paths for config and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Whether running in portable mode (config next to exe)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// In debug builds a `config.yaml` in the current directory wins, so
    /// `cargo run` picks up the working copy.
    ///
    /// Called before logging is initialised; diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            let cwd_config = cwd.join("config.yaml");
            if cwd_config.exists() {
                eprintln!("[paths] Running in DEV mode (config.yaml found in {})", cwd.display());
                return Self::portable(cwd);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::portable(exe_dir);
        }

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no config directory, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);
        let data_dir = dirs::data_dir()
            .map(|d| d.join(APP_NAME))
            .unwrap_or_else(|| config_dir.clone());

        Self {
            config: config_dir.join("config.yaml"),
            logs_dir: data_dir.join("logs"),
            is_portable: false,
        }
    }

    fn portable(base: PathBuf) -> Self {
        Self {
            config: base.join("config.yaml"),
            logs_dir: base.join("logs"),
            is_portable: true,
        }
    }

    /// Directory holding the config file
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// File log directory: the requested one, else the detected default
    pub fn log_dir(&self, requested: Option<&Path>) -> PathBuf {
        requested
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.logs_dir.clone())
    }

    /// Create the config and log directories
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [self.base_dir(), self.logs_dir.clone()] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_portable_layout() {
        let paths = AppPaths::portable(PathBuf::from("/opt/knob"));
        assert!(paths.is_portable);
        assert_eq!(paths.config, PathBuf::from("/opt/knob/config.yaml"));
        assert_eq!(paths.logs_dir, PathBuf::from("/opt/knob/logs"));
        assert_eq!(paths.base_dir(), PathBuf::from("/opt/knob"));
    }

    #[test]
    fn test_log_dir_defaults_to_detected() {
        let paths = AppPaths::portable(PathBuf::from("/opt/knob"));
        assert_eq!(paths.log_dir(None), PathBuf::from("/opt/knob/logs"));
        assert_eq!(
            paths.log_dir(Some(Path::new("/var/log/knob"))),
            PathBuf::from("/var/log/knob")
        );
    }

    #[test]
    fn test_ensure_directories() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let paths = AppPaths {
            config: temp_dir.path().join("etc/config.yaml"),
            logs_dir: temp_dir.path().join("var/logs"),
            is_portable: false,
        };
        paths.ensure_directories()?;
        assert!(temp_dir.path().join("etc").is_dir());
        assert!(paths.logs_dir.is_dir());
        Ok(())
    }
}
