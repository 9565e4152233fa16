//! Journal entry types and stream names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type tag of a journal entry.
///
/// The set is fixed; which fields each type requires is declared in the
/// configuration schema, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Command,
    CommandOutput,
    CommandError,
    Action,
    Event,
    Stdout,
    Stderr,
}

impl LogType {
    /// Every log type, in declaration order.
    pub const ALL: [LogType; 12] = [
        LogType::Debug,
        LogType::Info,
        LogType::Warning,
        LogType::Error,
        LogType::Critical,
        LogType::Command,
        LogType::CommandOutput,
        LogType::CommandError,
        LogType::Action,
        LogType::Event,
        LogType::Stdout,
        LogType::Stderr,
    ];

    /// Tag as written in the log file and the config schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Debug => "DEBUG",
            LogType::Info => "INFO",
            LogType::Warning => "WARNING",
            LogType::Error => "ERROR",
            LogType::Critical => "CRITICAL",
            LogType::Command => "COMMAND",
            LogType::CommandOutput => "COMMAND_OUTPUT",
            LogType::CommandError => "COMMAND_ERROR",
            LogType::Action => "ACTION",
            LogType::Event => "EVENT",
            LogType::Stdout => "STDOUT",
            LogType::Stderr => "STDERR",
        }
    }

    /// Whether writing this type bumps the error counter.
    pub fn is_error(&self) -> bool {
        matches!(self, LogType::Error)
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        LogType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| format!("unknown log type: {}", s))
    }
}

/// Output stream of a supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl StreamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamName::Stdout => "STDOUT",
            StreamName::Stderr => "STDERR",
        }
    }

    /// Journal type used for lines read from this stream.
    pub fn log_type(&self) -> LogType {
        match self {
            StreamName::Stdout => LogType::Stdout,
            StreamName::Stderr => LogType::Stderr,
        }
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
