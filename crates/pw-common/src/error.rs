//! Error types for procwarden.
//!
//! Every failure is an explicit value carrying the context needed to report
//! it (command, stream, path, ...). Components decide whether to record an
//! error in the journal; the error itself has no logging side effects.
//!
//! Errors expose:
//! - a stable numeric code for machine parsing
//! - a category for grouping
//! - a recoverability hint
//!
//! Code ranges:
//! - 10-19: configuration
//! - 20-29: journal
//! - 30-39: credentials
//! - 40-49: process supervision
//! - 60-69: I/O and serialization

use crate::log_type::{LogType, StreamName};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for procwarden operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration loading and persistence.
    Config,
    /// Structured journal writes.
    Journal,
    /// Escalation secret storage and hashing.
    Credential,
    /// Child process lifecycle.
    Process,
    /// File I/O and serialization.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Journal => write!(f, "journal"),
            ErrorCategory::Credential => write!(f, "credential"),
            ErrorCategory::Process => write!(f, "process"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for procwarden.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to persist configuration to {path}: {message}")]
    ConfigPersist { path: PathBuf, message: String },

    // Journal errors (20-29)
    #[error("{log_type} entry is missing required field `{field}`")]
    MissingField { log_type: LogType, field: String },

    #[error("log type {0} is not declared in the schema")]
    UndeclaredLogType(LogType),

    // Credential errors (30-39)
    #[error("escalation secret unavailable: {reason}")]
    CredentialUnavailable { reason: String },

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("secret store error: {0}")]
    SecretStore(String),

    // Process errors (40-49)
    #[error("failed to spawn `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("a process is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("no process is running")]
    NotRunning,

    #[error("failed to terminate pid {pid}: {message}")]
    Termination { pid: u32, message: String },

    #[error("failed reading {stream} of pid {pid}: {message}")]
    StreamRead {
        stream: StreamName,
        pid: u32,
        message: String,
    },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::ConfigPersist { .. } => 11,
            Error::MissingField { .. } => 20,
            Error::UndeclaredLogType(_) => 21,
            Error::CredentialUnavailable { .. } => 30,
            Error::Hash(_) => 31,
            Error::SecretStore(_) => 32,
            Error::Spawn { .. } => 40,
            Error::AlreadyRunning { .. } => 41,
            Error::NotRunning => 42,
            Error::Termination { .. } => 43,
            Error::StreamRead { .. } => 44,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::ConfigPersist { .. } => ErrorCategory::Config,

            Error::MissingField { .. } | Error::UndeclaredLogType(_) => ErrorCategory::Journal,

            Error::CredentialUnavailable { .. } | Error::Hash(_) | Error::SecretStore(_) => {
                ErrorCategory::Credential
            }

            Error::Spawn { .. }
            | Error::AlreadyRunning { .. }
            | Error::NotRunning
            | Error::Termination { .. }
            | Error::StreamRead { .. } => ErrorCategory::Process,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable by the caller.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::ConfigPersist { .. } => true,
            Error::MissingField { .. } => true,
            Error::UndeclaredLogType(_) => true,
            Error::CredentialUnavailable { .. } => true, // store a secret first
            Error::Hash(_) => false,
            Error::SecretStore(_) => true,
            Error::Spawn { .. } => false,
            Error::AlreadyRunning { .. } => true, // stop first
            Error::NotRunning => true,
            Error::Termination { .. } => false,
            Error::StreamRead { .. } => false,
            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Command line the error relates to, when there is one.
    pub fn command(&self) -> Option<&str> {
        match self {
            Error::Spawn { command, .. } => Some(command),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_categories() {
        let cases: Vec<(Error, ErrorCategory)> = vec![
            (Error::Config("x".into()), ErrorCategory::Config),
            (
                Error::MissingField {
                    log_type: LogType::Action,
                    field: "action".into(),
                },
                ErrorCategory::Journal,
            ),
            (
                Error::CredentialUnavailable {
                    reason: "none".into(),
                },
                ErrorCategory::Credential,
            ),
            (Error::NotRunning, ErrorCategory::Process),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")),
                ErrorCategory::Io,
            ),
        ];

        for (err, category) in cases {
            assert_eq!(err.category(), category, "{err}");
            let range = match category {
                ErrorCategory::Config => 10..20,
                ErrorCategory::Journal => 20..30,
                ErrorCategory::Credential => 30..40,
                ErrorCategory::Process => 40..50,
                ErrorCategory::Io => 60..70,
            };
            assert!(range.contains(&err.code()), "{err} -> {}", err.code());
        }
    }

    #[test]
    fn test_display_carries_context() {
        let err = Error::Spawn {
            command: "/bin/nope --flag".into(),
            message: "No such file or directory".into(),
        };
        assert_eq!(err.command(), Some("/bin/nope --flag"));
        assert!(err.to_string().contains("/bin/nope --flag"));

        let err = Error::StreamRead {
            stream: StreamName::Stderr,
            pid: 42,
            message: "broken pipe".into(),
        };
        assert_eq!(err.to_string(), "failed reading STDERR of pid 42: broken pipe");
    }

    #[test]
    fn test_missing_field_message() {
        let err = Error::MissingField {
            log_type: LogType::CommandOutput,
            field: "output".into(),
        };
        assert_eq!(
            err.to_string(),
            "COMMAND_OUTPUT entry is missing required field `output`"
        );
    }

    #[test]
    fn test_category_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorCategory::Credential).unwrap(),
            "\"credential\""
        );
    }
}
