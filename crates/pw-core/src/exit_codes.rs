//! Exit codes for the procwarden CLI.
//!
//! Exit code ranges:
//! - 0-2: Operational outcomes (parse outcome from code, not output)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors

use pw_common::{Error, ErrorCategory};

/// Exit codes for procwarden operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-2)
    // ========================================================================
    /// Success
    Clean = 0,

    /// Verification ran and did not match
    NoMatch = 1,

    /// Supervised command exited unsuccessfully or was killed
    ChildFailed = 2,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Configuration missing or invalid
    ConfigError = 11,

    /// No escalation secret / no stored hash
    CredentialError = 12,

    /// Journal schema rejected the entry
    JournalError = 13,

    /// A command is already running
    BusyError = 14,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,

    /// Operation timed out
    TimeoutError = 22,

    /// Spawning or terminating the child failed
    ProcessError = 23,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success.
    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&self.as_i32())
    }

    /// Check if this exit code indicates any error requiring attention.
    pub fn is_error(self) -> bool {
        self.as_i32() >= 10
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::NoMatch => "OK_NO_MATCH",
            ExitCode::ChildFailed => "OK_CHILD_FAILED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::CredentialError => "ERR_CREDENTIAL",
            ExitCode::JournalError => "ERR_JOURNAL",
            ExitCode::BusyError => "ERR_BUSY",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::TimeoutError => "ERR_TIMEOUT",
            ExitCode::ProcessError => "ERR_PROCESS",
        }
    }

    /// Map a library error to the exit code the CLI reports for it.
    pub fn for_error(err: &Error) -> ExitCode {
        match err {
            Error::AlreadyRunning { .. } => ExitCode::BusyError,
            Error::Hash(_) => ExitCode::InternalError,
            _ => match err.category() {
                ErrorCategory::Config => ExitCode::ConfigError,
                ErrorCategory::Journal => ExitCode::JournalError,
                ErrorCategory::Credential => ExitCode::CredentialError,
                ErrorCategory::Process => ExitCode::ProcessError,
                ErrorCategory::Io => ExitCode::IoError,
            },
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
