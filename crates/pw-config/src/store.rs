//! Loading and atomic persistence of `config.json`.

use crate::settings::{LogCounters, Settings};
use crate::validate::{validate_settings, ValidationError};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors that can occur while loading or persisting the config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Semantic validation failed for {path}: {source}")]
    Validation {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },

    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for pw_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Persist { path, source } => pw_common::Error::ConfigPersist {
                path,
                message: source.to_string(),
            },
            other => pw_common::Error::Config(other.to_string()),
        }
    }
}

/// The configuration file together with its loaded contents.
///
/// Loaded once at startup; counters are mutated only by the journal, which
/// owns the store.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    settings: Settings,
}

impl ConfigStore {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();

        let settings = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            let settings: Settings =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                    path: path.clone(),
                    source: e,
                })?;
            validate_settings(&settings).map_err(|e| ConfigError::Validation {
                path: path.clone(),
                source: e,
            })?;
            debug!(path = %path.display(), "loaded config");
            settings
        } else {
            debug!(path = %path.display(), "config not found, using defaults");
            Settings::default()
        };

        Ok(ConfigStore { path, settings })
    }

    /// Wrap already-built settings (nothing is written until `persist`).
    pub fn with_settings(path: impl Into<PathBuf>, settings: Settings) -> Self {
        ConfigStore {
            path: path.into(),
            settings,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn counters(&self) -> LogCounters {
        self.settings.log.counters
    }

    /// Replace the counters in memory. Lower values are ignored so the
    /// counters never move backwards.
    pub fn set_counters(&mut self, counters: LogCounters) {
        let current = &mut self.settings.log.counters;
        current.entry_number = current.entry_number.max(counters.entry_number);
        current.error_number = current.error_number.max(counters.error_number);
    }

    /// Write the settings to disk atomically.
    pub fn persist(&self) -> Result<(), ConfigError> {
        write_json_atomic(&self.path, &self.settings).map_err(|e| ConfigError::Persist {
            path: self.path.clone(),
            source: e,
        })?;
        trace!(
            path = %self.path.display(),
            entry_number = self.settings.log.counters.entry_number,
            "persisted config"
        );
        Ok(())
    }
}

/// Serialize `value` as pretty JSON and replace `path` atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let mut content = serde_json::to_vec_pretty(value)?;
    content.push(b'\n');
    write_atomic(path, &content, false)
}

/// Replace `path` with `bytes` via temp file + fsync + rename.
///
/// A crash leaves either the old or the new file, never a truncated one.
/// `private` restricts the file to the owner (0600) on unix.
pub fn write_atomic(path: &Path, bytes: &[u8], private: bool) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("procwarden");
    let tmp_path = path.with_file_name(format!(".{}.tmp.{}", file_name, std::process::id()));

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    let written = options.open(&tmp_path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| std::fs::rename(&tmp_path, path)) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}
