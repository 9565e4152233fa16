//! Typed view of `config.json`.

use pw_common::LogType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root of the persisted configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Journal counters and schema.
    pub log: LogSection,

    /// Operator ceilings for the password hash parameters.
    pub hash_parameters: HashCaps,

    /// Paths consumed by the front end (carried, not used by the core).
    pub paths: PathsSection,

    /// Unknown top-level sections, preserved across rewrites.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `log` section: persisted counters plus the per-type field schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    #[serde(flatten)]
    pub counters: LogCounters,

    pub types: LogSchema,
}

/// Persisted journal counters. Never decrease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogCounters {
    /// Sequence number of the last entry written.
    pub entry_number: u64,
    /// Number of ERROR entries written.
    pub error_number: u64,
}

impl LogCounters {
    /// Counters after one more entry of `log_type`.
    pub fn advanced(self, log_type: LogType) -> Self {
        LogCounters {
            entry_number: self.entry_number + 1,
            error_number: self.error_number + u64::from(log_type.is_error()),
        }
    }
}

/// Required field names per log type, in rendering order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogSchema(BTreeMap<LogType, Vec<String>>);

impl LogSchema {
    /// A schema with no declared types.
    pub fn empty() -> Self {
        LogSchema(BTreeMap::new())
    }

    /// Required fields for `log_type`, or None if the type is not declared.
    pub fn required(&self, log_type: LogType) -> Option<&[String]> {
        self.0.get(&log_type).map(Vec::as_slice)
    }

    /// Declare (or replace) the required fields of a type.
    pub fn declare<I, S>(&mut self, log_type: LogType, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(log_type, fields.into_iter().map(Into::into).collect());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LogType, &Vec<String>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for LogSchema {
    fn default() -> Self {
        let mut schema = LogSchema::empty();
        schema.declare(LogType::Debug, ["message"]);
        schema.declare(LogType::Info, ["message"]);
        schema.declare(LogType::Warning, ["message"]);
        schema.declare(LogType::Error, ["code", "caller", "message"]);
        schema.declare(LogType::Critical, ["message"]);
        schema.declare(LogType::Command, ["command", "requires_sudo", "invoker"]);
        schema.declare(LogType::CommandOutput, ["output"]);
        schema.declare(LogType::CommandError, ["error"]);
        schema.declare(LogType::Action, ["action", "invoker", "output"]);
        schema.declare(LogType::Event, ["event_name", "event_details"]);
        schema.declare(LogType::Stdout, ["line"]);
        schema.declare(LogType::Stderr, ["line"]);
        schema
    }
}

/// `hash_parameters` section. Zero means "no cap".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HashCaps {
    /// Ceiling for the memory cost, in KiB.
    pub memory_cost_cap: u32,
    /// Ceiling for the number of passes.
    pub time_cost_cap: u32,
    /// Ceiling for the number of lanes.
    pub parallelism_cost_cap: u32,
}

/// `paths` section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub vpns: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_declares_every_type() {
        let schema = LogSchema::default();
        for t in LogType::ALL {
            let fields = schema.required(t).expect("declared");
            assert!(!fields.is_empty(), "{t} has no fields");
        }
        assert_eq!(
            schema.required(LogType::Action).unwrap(),
            &["action", "invoker", "output"]
        );
    }

    #[test]
    fn test_counters_advance() {
        let c = LogCounters::default();
        let c = c.advanced(LogType::Info);
        assert_eq!(c, LogCounters { entry_number: 1, error_number: 0 });
        let c = c.advanced(LogType::Error);
        assert_eq!(c, LogCounters { entry_number: 2, error_number: 1 });
    }

    #[test]
    fn test_settings_json_shape() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["log"]["entry_number"], 0);
        assert_eq!(json["log"]["error_number"], 0);
        assert_eq!(json["log"]["types"]["STDOUT"][0], "line");
        assert_eq!(json["hash_parameters"]["memory_cost_cap"], 0);
        assert!(json["paths"]["vpns"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{ "log": { "entry_number": 7 }, "window": { "w": 800 } }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.log.counters.entry_number, 7);
        assert_eq!(settings.log.counters.error_number, 0);
        assert_eq!(settings.log.types, LogSchema::default());
        assert_eq!(settings.extra["window"]["w"], 800);
    }
}
