//! Journal entry type, tree rendering, and parsing back from text.
//!
//! Block layout:
//!
//! ```text
//! Entry 3 :
//! ├── Timestamp : 2026-10-19T08:15:02.123456Z
//! └── Type : ACTION
//!     ├── action : spawn
//!     ├── invoker : procwarden
//!     │   second line of a multi-line value
//!     └── output : 0
//!
//! ```
//!
//! Only a line starting at column 0 with `Entry <digits> :` opens a block.
//! Continuation lines of multi-line values are always indented, so no field
//! value can forge a boundary.

use chrono::{DateTime, SecondsFormat, Utc};
use pw_common::LogType;
use serde::Serialize;
use std::fmt::Write as _;

const MARKER_PREFIX: &str = "Entry ";
const MARKER_SUFFIX: &str = " :";
const TIMESTAMP_PREFIX: &str = "├── Timestamp : ";
const TYPE_PREFIX: &str = "└── Type : ";
const FIELD_BRANCH: &str = "    ├── ";
const FIELD_LEAF: &str = "    └── ";
const CONT_BRANCH: &str = "    │   ";
const CONT_LEAF: &str = "        ";
const FIELD_SEPARATOR: &str = " : ";

/// One journal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Monotonic sequence number (`Entry N`).
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub log_type: LogType,
    /// Required fields in schema order.
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Value of a field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Render the block, including the trailing blank line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}{}{}", MARKER_PREFIX, self.sequence, MARKER_SUFFIX);
        let _ = writeln!(
            out,
            "{}{}",
            TIMESTAMP_PREFIX,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
        );
        let _ = writeln!(out, "{}{}", TYPE_PREFIX, self.log_type);

        let last = self.fields.len().saturating_sub(1);
        for (i, (name, value)) in self.fields.iter().enumerate() {
            let (head, cont) = if i == last {
                (FIELD_LEAF, CONT_LEAF)
            } else {
                (FIELD_BRANCH, CONT_BRANCH)
            };
            // Split on '\n' only: trailing newlines and '\r' survive a round trip.
            let mut lines = value.split('\n');
            let first = lines.next().unwrap_or("");
            let _ = writeln!(out, "{}{}{}{}", head, name, FIELD_SEPARATOR, first);
            for line in lines {
                let _ = writeln!(out, "{}{}", cont, line);
            }
        }
        out.push('\n');
        out
    }
}

/// Sequence number if `line` is a block marker.
pub fn marker_sequence(line: &str) -> Option<u64> {
    let digits = line
        .strip_prefix(MARKER_PREFIX)?
        .strip_suffix(MARKER_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Byte offset of every marker line, in file order.
pub fn block_offsets(text: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut pos = 0;
    for line in text.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\n', '\r']);
        if marker_sequence(bare).is_some() {
            offsets.push(pos);
        }
        pos += line.len();
    }
    offsets
}

/// Parse every well-formed block.
///
/// Blocks missing a timestamp or type line are skipped; the count of skipped
/// blocks is returned alongside.
pub fn parse_entries(text: &str) -> (Vec<LogEntry>, usize) {
    let mut entries = Vec::new();
    let mut skipped = 0;
    let mut current: Option<PartialEntry> = None;

    for line in text.split('\n') {
        if let Some(seq) = marker_sequence(line.strip_suffix('\r').unwrap_or(line)) {
            if let Some(done) = current.take() {
                match done.finish() {
                    Some(e) => entries.push(e),
                    None => skipped += 1,
                }
            }
            current = Some(PartialEntry::new(seq));
            continue;
        }
        if let Some(partial) = current.as_mut() {
            partial.feed(line);
        }
    }
    if let Some(done) = current {
        match done.finish() {
            Some(e) => entries.push(e),
            None => skipped += 1,
        }
    }
    (entries, skipped)
}

struct PartialEntry {
    sequence: u64,
    timestamp: Option<DateTime<Utc>>,
    log_type: Option<LogType>,
    fields: Vec<(String, String)>,
}

impl PartialEntry {
    fn new(sequence: u64) -> Self {
        PartialEntry {
            sequence,
            timestamp: None,
            log_type: None,
            fields: Vec::new(),
        }
    }

    fn feed(&mut self, line: &str) {
        if let Some(ts) = line.strip_prefix(TIMESTAMP_PREFIX) {
            self.timestamp = DateTime::parse_from_rfc3339(ts.trim())
                .ok()
                .map(|t| t.with_timezone(&Utc));
        } else if let Some(t) = line.strip_prefix(TYPE_PREFIX) {
            self.log_type = t.trim_end_matches('\r').parse().ok();
        } else if let Some(rest) = line
            .strip_prefix(FIELD_BRANCH)
            .or_else(|| line.strip_prefix(FIELD_LEAF))
        {
            let (name, value) = rest.split_once(FIELD_SEPARATOR).unwrap_or((rest, ""));
            self.fields.push((name.to_string(), value.to_string()));
        } else if let Some(cont) = line
            .strip_prefix(CONT_BRANCH)
            .or_else(|| line.strip_prefix(CONT_LEAF))
        {
            if let Some((_, value)) = self.fields.last_mut() {
                value.push('\n');
                value.push_str(cont);
            }
        }
    }

    fn finish(self) -> Option<LogEntry> {
        Some(LogEntry {
            sequence: self.sequence,
            timestamp: self.timestamp?,
            log_type: self.log_type?,
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(sequence: u64, fields: &[(&str, &str)]) -> LogEntry {
        LogEntry {
            sequence,
            timestamp: Utc.with_ymd_and_hms(2026, 10, 19, 8, 15, 2).unwrap(),
            log_type: LogType::Action,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_render_layout() {
        let entry = sample(3, &[("action", "spawn"), ("invoker", "cli"), ("output", "0")]);
        let expected = "Entry 3 :\n\
                        ├── Timestamp : 2026-10-19T08:15:02.000000Z\n\
                        └── Type : ACTION\n    \
                        ├── action : spawn\n    \
                        ├── invoker : cli\n    \
                        └── output : 0\n\n";
        assert_eq!(entry.render(), expected);
    }

    #[test]
    fn test_multiline_values_cannot_forge_markers() {
        let entry = sample(
            1,
            &[
                ("action", "first\nEntry 99 :\nthird"),
                ("invoker", "x"),
                ("output", "a\nEntry 100 :"),
            ],
        );
        let text = entry.render();
        assert_eq!(block_offsets(&text), vec![0]);

        let (parsed, skipped) = parse_entries(&text);
        assert_eq!(skipped, 0);
        assert_eq!(parsed, vec![entry]);
    }

    #[test]
    fn test_marker_sequence() {
        assert_eq!(marker_sequence("Entry 12 :"), Some(12));
        assert_eq!(marker_sequence("Entry  :"), None);
        assert_eq!(marker_sequence("Entry 1a :"), None);
        assert_eq!(marker_sequence("    Entry 1 :"), None);
        assert_eq!(marker_sequence("Entry 1"), None);
    }

    #[test]
    fn test_parse_skips_broken_blocks() {
        let good = sample(2, &[("action", "a"), ("invoker", "b"), ("output", "c")]);
        let text = format!("Entry 1 :\n└── Type : ACTION\n\n{}", good.render());
        let (parsed, skipped) = parse_entries(&text);
        assert_eq!(skipped, 1);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].field("output"), Some("c"));
    }

    #[test]
    fn test_trailing_newline_and_cr_round_trip() {
        let entry = sample(
            6,
            &[("message", "x\n"), ("output", "a\r\nb\r\n\n")],
        );
        let (parsed, skipped) = parse_entries(&entry.render());
        assert_eq!(skipped, 0);
        assert_eq!(parsed[0], entry);
    }

    #[test]
    fn test_empty_value_round_trips() {
        let entry = sample(4, &[("action", ""), ("invoker", "x"), ("output", "")]);
        let (parsed, _) = parse_entries(&entry.render());
        assert_eq!(parsed[0], entry);
    }
}
