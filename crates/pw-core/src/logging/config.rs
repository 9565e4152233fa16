//! Diagnostic level and format, resolved from CLI flags and `PW_LOG`.
//!
//! The format comes straight from `--log-format` (or its `PW_LOG_FORMAT`
//! fallback); a full `RUST_LOG` directive string is handled by the filter in
//! [`super::init_logging`].

use clap::ValueEnum;
use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;

/// Level override consulted when no `-v`/`-q` flag is given.
pub const ENV_LOG_LEVEL: &str = "PW_LOG";

/// How diagnostics are rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Human,
    Jsonl,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LevelFilter,
    /// File, line and thread name on human-format events.
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig::new(LogConfig::DEFAULT_LEVEL, LogFormat::Human)
    }
}

impl LogConfig {
    /// stderr stays quiet unless asked otherwise.
    pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::WARN;

    pub fn new(level: LevelFilter, format: LogFormat) -> Self {
        LogConfig {
            format,
            level,
            source_location: false,
        }
    }

    /// Flag level if given, else `PW_LOG`, else [`Self::DEFAULT_LEVEL`].
    pub fn resolve(flag_level: Option<LevelFilter>, format: LogFormat) -> Self {
        let level = flag_level
            .or_else(|| {
                std::env::var(ENV_LOG_LEVEL)
                    .ok()
                    .and_then(|v| parse_level(&v))
            })
            .unwrap_or(Self::DEFAULT_LEVEL);
        LogConfig::new(level, format)
    }

    pub fn with_source_location(mut self, enabled: bool) -> Self {
        self.source_location = enabled;
        self
    }

    /// Level implied by repeated `-v` / `-q` flags, if any were given.
    pub fn level_from_flags(verbose: u8, quiet: bool) -> Option<LevelFilter> {
        if quiet {
            return Some(LevelFilter::ERROR);
        }
        match verbose {
            0 => None,
            1 => Some(LevelFilter::INFO),
            2 => Some(LevelFilter::DEBUG),
            _ => Some(LevelFilter::TRACE),
        }
    }
}

/// Unparseable values are ignored rather than failing startup.
fn parse_level(value: &str) -> Option<LevelFilter> {
    LevelFilter::from_str(value.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_flags() {
        assert_eq!(LogConfig::level_from_flags(0, false), None);
        assert_eq!(LogConfig::level_from_flags(1, false), Some(LevelFilter::INFO));
        assert_eq!(LogConfig::level_from_flags(2, false), Some(LevelFilter::DEBUG));
        assert_eq!(LogConfig::level_from_flags(5, false), Some(LevelFilter::TRACE));
        assert_eq!(LogConfig::level_from_flags(2, true), Some(LevelFilter::ERROR));
    }

    #[test]
    fn test_flag_level_wins() {
        let config = LogConfig::resolve(Some(LevelFilter::DEBUG), LogFormat::Jsonl);
        assert_eq!(config.level, LevelFilter::DEBUG);
        assert_eq!(config.format, LogFormat::Jsonl);
        assert!(!config.source_location);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level(" off "), Some(LevelFilter::OFF));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_format_names() {
        assert_eq!(LogFormat::from_str("jsonl", true), Ok(LogFormat::Jsonl));
        assert_eq!(LogFormat::from_str("human", true), Ok(LogFormat::Human));
        assert!(LogFormat::from_str("xml", true).is_err());
    }
}
