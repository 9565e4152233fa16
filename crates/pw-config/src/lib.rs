//! procwarden configuration loading, validation and persistence.
//!
//! This crate provides:
//! - Typed Rust structs for `config.json` (journal counters and schema,
//!   hash parameter caps, carried GUI paths)
//! - Path resolution (CLI → env → XDG → working directory)
//! - Semantic validation
//! - Crash-safe persistence (temp file + rename)

pub mod resolve;
pub mod settings;
pub mod store;
pub mod validate;

pub use resolve::{resolve_paths, ConfigPaths, ConfigSource};
pub use settings::{HashCaps, LogCounters, LogSchema, LogSection, PathsSection, Settings};
pub use store::{write_atomic, write_json_atomic, ConfigError, ConfigStore};
pub use validate::{validate_settings, ValidationError, ValidationResult};

/// Config file name inside the config directory.
pub const CONFIG_FILENAME: &str = "config.json";
