//! Schema-driven, append-only journal with persisted counters.
//!
//! The journal is the product log: every supervisor and vault action, every
//! line a child prints, and every failure lands here as a numbered block
//! (see [`entry`] for the layout).
//!
//! # Durability
//!
//! A write appends and syncs the block first, then persists the advanced
//! counters through an atomic config rewrite. A crash between the two leaves
//! the file ahead of the counters; [`Journal::open`] detects this and moves
//! the counters forward before accepting new writes, so sequence numbers
//! never repeat.
//!
//! Counters only ever grow. [`Journal::flush`] shrinks the file and leaves
//! them alone.

pub mod entry;

pub use entry::LogEntry;

use chrono::Utc;
use pw_common::{Error, LogType, Result};
use pw_config::{write_atomic, ConfigStore, LogCounters, LogSchema, Settings};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

/// Shared journal handle. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    state: Mutex<JournalState>,
}

#[derive(Debug)]
struct JournalState {
    config: ConfigStore,
    file: Option<File>,
}

impl Journal {
    /// Open the journal at `path`, reconciling counters with its content.
    #[instrument(skip(config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: ConfigStore) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut config = config;
        if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            reconcile(&mut config, &text)?;
        }

        debug!(
            entry_number = config.counters().entry_number,
            error_number = config.counters().error_number,
            "journal opened"
        );
        Ok(Journal {
            path,
            state: Mutex::new(JournalState { config, file: None }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current counters.
    pub fn counters(&self) -> LogCounters {
        self.lock().config.counters()
    }

    /// Current schema.
    pub fn schema(&self) -> LogSchema {
        self.lock().config.settings().log.types.clone()
    }

    /// Snapshot of the whole configuration, counters included.
    pub fn settings(&self) -> Settings {
        self.lock().config.settings().clone()
    }

    /// Append one entry. Returns its sequence number.
    ///
    /// Every field the schema requires for `log_type` must be present;
    /// otherwise nothing is written and the counters are untouched. Fields
    /// the schema does not declare are dropped.
    #[instrument(level = "debug", skip(self, fields), fields(log_type = %log_type))]
    pub fn write<I, K, V>(&self, log_type: LogType, fields: I) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let provided: Vec<(K, V)> = fields.into_iter().collect();
        let mut state = self.lock();

        let required = state
            .config
            .settings()
            .log
            .types
            .required(log_type)
            .ok_or(Error::UndeclaredLogType(log_type))?;

        let mut ordered = Vec::with_capacity(required.len());
        for name in required {
            let value = provided
                .iter()
                .rev()
                .find(|(k, _)| k.as_ref() == name)
                .map(|(_, v)| v.as_ref().to_string())
                .ok_or_else(|| Error::MissingField {
                    log_type,
                    field: name.clone(),
                })?;
            ordered.push((name.clone(), value));
        }
        if provided.len() > ordered.len() {
            debug!(
                dropped = provided.len() - ordered.len(),
                "ignoring fields not declared in schema"
            );
        }

        let next = state.config.counters().advanced(log_type);
        let entry = LogEntry {
            sequence: next.entry_number,
            timestamp: Utc::now(),
            log_type,
            fields: ordered,
        };

        state.append(&self.path, &entry.render())?;
        state.config.set_counters(next);
        state.config.persist().map_err(|e| {
            warn!(error = %e, sequence = entry.sequence, "counters not persisted");
            Error::from(e)
        })?;

        Ok(entry.sequence)
    }

    /// Record `err` as an ERROR entry.
    pub fn record_error(&self, err: &Error, caller: &str) -> Result<u64> {
        let code = err.code().to_string();
        let message = err.to_string();
        self.write(
            LogType::Error,
            [
                ("code", code.as_str()),
                ("caller", caller),
                ("message", message.as_str()),
            ],
        )
    }

    /// Record `err` and hand it back, for `return Err(journal.report(..))`.
    ///
    /// A failure to record is traced, never raised in place of `err`.
    pub fn report(&self, err: Error, caller: &str) -> Error {
        if let Err(record_err) = self.record_error(&err, caller) {
            warn!(
                error = %err,
                record_error = %record_err,
                caller,
                "failed to journal error"
            );
        }
        err
    }

    /// Remove entries from the file. Returns how many were removed.
    ///
    /// `count == 0` empties the file. Otherwise the newest (`inverse`) or
    /// oldest (`!inverse`) `count` entries go; a count of at least the number
    /// present empties the file. The rewrite is atomic.
    #[instrument(skip(self))]
    pub fn flush(&self, count: usize, inverse: bool) -> Result<usize> {
        let mut state = self.lock();
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let offsets = entry::block_offsets(&text);
        let present = offsets.len();

        let (kept, removed) = if count == 0 || count >= present {
            (String::new(), present)
        } else if inverse {
            (text[..offsets[present - count]].to_string(), count)
        } else {
            let mut kept = String::with_capacity(text.len() - offsets[count]);
            kept.push_str(&text[..offsets[0]]);
            kept.push_str(&text[offsets[count]..]);
            (kept, count)
        };

        // The cached append handle points at the old inode after the rename.
        state.file = None;
        write_atomic(&self.path, kept.as_bytes(), false)?;

        info!(removed, remaining = present - removed, inverse, "journal flushed");
        Ok(removed)
    }

    /// Parse the file back into entries.
    pub fn entries(&self) -> Result<Vec<LogEntry>> {
        let _state = self.lock();
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let (entries, skipped) = entry::parse_entries(&text);
        if skipped > 0 {
            warn!(skipped, path = %self.path.display(), "skipped malformed journal blocks");
        }
        Ok(entries)
    }

    /// Raw file content.
    pub fn read_raw(&self) -> Result<String> {
        let _state = self.lock();
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JournalState> {
        // A panic mid-write leaves at worst a partial block, which the parser
        // skips; keep serving.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JournalState {
    fn append(&mut self, path: &Path, block: &str) -> std::io::Result<()> {
        if self.file.is_none() {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            self.file = Some(file);
        }
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.write_all(block.as_bytes()).and_then(|_| file.sync_data()) {
                self.file = None;
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Move counters forward past any entries the file holds beyond them.
fn reconcile(config: &mut ConfigStore, text: &str) -> Result<()> {
    let counters = config.counters();
    let (entries, _) = entry::parse_entries(text);
    let max_marker = entry::block_offsets(text)
        .into_iter()
        .filter_map(|off| {
            let line = text[off..].lines().next()?;
            entry::marker_sequence(line)
        })
        .max()
        .unwrap_or(0);

    if max_marker <= counters.entry_number {
        return Ok(());
    }

    let unaccounted_errors = entries
        .iter()
        .filter(|e| e.sequence > counters.entry_number && e.log_type.is_error())
        .count() as u64;
    let repaired = LogCounters {
        entry_number: max_marker,
        error_number: counters.error_number + unaccounted_errors,
    };
    warn!(
        persisted = counters.entry_number,
        found = max_marker,
        "journal ahead of persisted counters, reconciling"
    );
    config.set_counters(repaired);
    config.persist()?;
    Ok(())
}
