//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI arguments → environment variables → XDG paths → working directory.

use std::path::{Path, PathBuf};

use crate::CONFIG_FILENAME;

/// Discovered file locations.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Path to config.json (may not exist yet).
    pub config_file: PathBuf,

    /// Path to the journal file.
    pub log_file: PathBuf,

    /// Path to the file-backed secret store.
    pub secrets_file: PathBuf,

    /// Source of the config directory (for diagnostics).
    pub config_source: ConfigSource,

    /// Source of the journal path (for diagnostics).
    pub log_source: ConfigSource,
}

/// Where a location came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Platform directory (XDG on Linux).
    XdgConfig,

    /// Nothing else available; relative to the working directory.
    #[default]
    WorkingDirectory,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG directory"),
            ConfigSource::WorkingDirectory => write!(f, "working directory"),
        }
    }
}

/// Environment variable names.
pub const ENV_CONFIG_DIR: &str = "PROCWARDEN_CONFIG_DIR";
pub const ENV_LOG_PATH: &str = "PROCWARDEN_LOG";
pub const ENV_DATA_DIR: &str = "PROCWARDEN_DATA_DIR";

const LOG_FILENAME: &str = "log.txt";
const SECRETS_FILENAME: &str = "secrets.json";

/// Application name for XDG directories.
const APP_NAME: &str = "procwarden";

/// Resolve all locations.
///
/// Config directory: `cli_config_dir` → `PROCWARDEN_CONFIG_DIR` → `<config dir>/procwarden`.
/// Journal: `cli_log_file` → `PROCWARDEN_LOG` → `<data dir>/procwarden/log.txt`.
/// Secrets: `PROCWARDEN_DATA_DIR` or `<data dir>/procwarden`, then `secrets.json`.
pub fn resolve_paths(cli_config_dir: Option<&Path>, cli_log_file: Option<&Path>) -> ConfigPaths {
    let (config_dir, config_source) = pick(cli_config_dir, ENV_CONFIG_DIR, xdg_config_dir());
    let data_dir = data_dir();
    let (log_file, log_source) = pick(cli_log_file, ENV_LOG_PATH, Some(data_dir.join(LOG_FILENAME)));

    ConfigPaths {
        config_file: config_dir.join(CONFIG_FILENAME),
        log_file,
        secrets_file: data_dir.join(SECRETS_FILENAME),
        config_source,
        log_source,
    }
}

fn pick(cli: Option<&Path>, env_var: &str, xdg: Option<PathBuf>) -> (PathBuf, ConfigSource) {
    // 1. CLI argument
    if let Some(path) = cli {
        return (path.to_path_buf(), ConfigSource::CliArgument);
    }

    // 2. Environment variable
    if let Some(value) = std::env::var_os(env_var) {
        if !value.is_empty() {
            return (PathBuf::from(value), ConfigSource::Environment);
        }
    }

    // 3. Platform directory
    if let Some(path) = xdg {
        return (path, ConfigSource::XdgConfig);
    }

    (PathBuf::from(format!(".{}", APP_NAME)), ConfigSource::WorkingDirectory)
}

/// Data directory for the journal and file-backed secrets.
pub fn data_dir() -> PathBuf {
    if let Some(value) = std::env::var_os(ENV_DATA_DIR) {
        if !value.is_empty() {
            return PathBuf::from(value);
        }
    }
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_NAME)))
}

/// Get the platform config directory for procwarden.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}
