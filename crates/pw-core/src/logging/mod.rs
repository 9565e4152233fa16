//! Diagnostic logging for procwarden.
//!
//! This is the operator-facing `tracing` output on stderr. It is separate from
//! the journal (`crate::journal`), which is the persisted product log.
//!
//! Two modes:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSON lines for scripted use
//!
//! stdout is reserved for command payloads (`log show`, `config show`, child
//! output echo); all diagnostics go to stderr.

pub mod config;

pub use config::{LogConfig, LogFormat};

use std::io::IsTerminal;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events pass the default filter.
const TARGETS: [&str; 3] = ["procwarden", "pw_core", "pw_config"];

fn default_filter(level: LevelFilter) -> EnvFilter {
    let directives = TARGETS
        .iter()
        .map(|t| format!("{}={}", t, level))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::new(directives)
}

/// Initialize the logging subsystem.
///
/// Must be called once at startup before any logging occurs. A second call is
/// a no-op. An explicit RUST_LOG directive string wins over `config.level`.
pub fn init_logging(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.level));

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(config.source_location)
                .with_file(config.source_location)
                .with_line_number(config.source_location)
                .with_ansi(use_ansi);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init()
        }
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}

/// Shorten a string for a diagnostic line.
pub fn truncate_for_log(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...(truncated)", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("abcdef", 3), "abc...(truncated)");
        // Multi-byte characters are never split.
        assert_eq!(truncate_for_log("ééé", 2), "éé...(truncated)");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LogConfig::new(LevelFilter::OFF, LogFormat::Human);
        init_logging(&config);
        init_logging(&config);
    }
}
