//! Per-stream drain threads.

use super::process::has_exited;
use crate::journal::Journal;
use crate::logging::truncate_for_log;
use pw_common::{Error, Result, StreamName};
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{trace, warn};

/// Outcome of one drain thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub stream: StreamName,
    /// Lines read from the stream.
    pub lines: u64,
    /// Lines that could not be journaled.
    pub journal_failures: u64,
}

/// Settings shared by both drains of one run.
#[derive(Debug, Clone)]
pub struct DrainOptions {
    pub echo_to_console: bool,
    pub poll_interval: Duration,
}

/// A running drain thread.
#[derive(Debug)]
pub struct DrainTask {
    pub stream: StreamName,
    pub handle: JoinHandle<Result<DrainReport>>,
}

impl DrainTask {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Start draining `reader` on a named thread.
pub fn spawn<R>(
    stream: StreamName,
    reader: R,
    pid: u32,
    journal: Arc<Journal>,
    cancel: Arc<AtomicBool>,
    options: DrainOptions,
) -> std::io::Result<DrainTask>
where
    R: Read + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(format!("pw-drain-{}", stream.as_str().to_ascii_lowercase()))
        .spawn(move || run(stream, reader, pid, &journal, &cancel, &options))?;
    Ok(DrainTask { stream, handle })
}

/// Read lines until end-of-stream *and* process exit (or cancellation).
///
/// End-of-stream alone is not trusted as the end: the exit is checked first
/// and the read retried after `poll_interval` while the process lives. The
/// cancel flag is consulted only when no data is available, so output the
/// process wrote before dying is always drained.
fn run<R: Read>(
    stream: StreamName,
    reader: R,
    pid: u32,
    journal: &Journal,
    cancel: &AtomicBool,
    options: &DrainOptions,
) -> Result<DrainReport> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    let mut report = DrainReport {
        stream,
        lines: 0,
        journal_failures: 0,
    };

    loop {
        buf.clear();
        let n = match reader.read_until(b'\n', &mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let err = Error::StreamRead {
                    stream,
                    pid,
                    message: e.to_string(),
                };
                return Err(journal.report(err, "supervisor::drain"));
            }
        };

        if n == 0 {
            if has_exited(pid) || cancel.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(options.poll_interval);
            continue;
        }

        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);
        report.lines += 1;
        trace!(%stream, pid, line = %truncate_for_log(line, 120), "output line");

        if options.echo_to_console {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{} : {}", stream, line);
        }
        if let Err(e) = journal.write(stream.log_type(), [("line", line)]) {
            report.journal_failures += 1;
            warn!(%stream, pid, error = %e, "failed to journal output line");
        }
    }

    trace!(%stream, pid, lines = report.lines, "drain finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_common::LogType;
    use pw_config::ConfigStore;
    use std::io::Cursor;
    use tempfile::TempDir;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
        }
    }

    fn journal_in(tmp: &TempDir) -> Arc<Journal> {
        let config = ConfigStore::load(tmp.path().join("config.json")).unwrap();
        Arc::new(Journal::open(tmp.path().join("log.txt"), config).unwrap())
    }

    fn options() -> DrainOptions {
        DrainOptions {
            echo_to_console: false,
            poll_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_lines_are_journaled_with_stream_type() {
        let tmp = TempDir::new().unwrap();
        let journal = journal_in(&tmp);
        // Cancelled before the first read: buffered lines still come through.
        let input = Cursor::new(b"one\r\ntwo\n\xffbad\nlast".to_vec());
        let report = run(
            StreamName::Stderr,
            input,
            0,
            &journal,
            &AtomicBool::new(true),
            &options(),
        )
        .unwrap();
        assert_eq!(report.lines, 4);
        assert_eq!(report.journal_failures, 0);

        let entries = journal.entries().unwrap();
        let lines: Vec<&str> = entries.iter().map(|e| e.field("line").unwrap()).collect();
        assert_eq!(lines, ["one", "two", "\u{fffd}bad", "last"]);
        assert!(entries.iter().all(|e| e.log_type == LogType::Stderr));
    }

    #[test]
    fn test_read_error_is_reported_and_ends_task() {
        let tmp = TempDir::new().unwrap();
        let journal = journal_in(&tmp);
        let err = run(
            StreamName::Stdout,
            FailingReader,
            0,
            &journal,
            &AtomicBool::new(false),
            &options(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::StreamRead { stream: StreamName::Stdout, .. }));
        assert_eq!(journal.counters().error_number, 1);
    }

    #[test]
    fn test_spawned_thread_is_named() {
        let tmp = TempDir::new().unwrap();
        let journal = journal_in(&tmp);
        let task = spawn(
            StreamName::Stdout,
            Cursor::new(Vec::new()),
            0,
            journal,
            Arc::new(AtomicBool::new(true)),
            options(),
        )
        .unwrap();
        assert_eq!(task.handle.thread().name(), Some("pw-drain-stdout"));
        assert_eq!(task.handle.join().unwrap().unwrap().lines, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_reaped_child_ends_drain_without_cancel() {
        let tmp = TempDir::new().unwrap();
        let journal = journal_in(&tmp);
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let report = run(
            StreamName::Stdout,
            Cursor::new(b"done\n".to_vec()),
            pid,
            &journal,
            &AtomicBool::new(false),
            &options(),
        )
        .unwrap();
        assert_eq!(report.lines, 1);
    }
}
