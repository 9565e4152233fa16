//! End-to-end tests for the procwarden binary.
//!
//! Every invocation points config, journal and secrets at a temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// Get a Command for the procwarden binary, isolated in `dir`.
fn procwarden(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("procwarden").expect("procwarden binary should exist");
    cmd.arg("--config-dir")
        .arg(dir)
        .arg("--log-file")
        .arg(dir.join("log.txt"))
        .env("PROCWARDEN_DATA_DIR", dir)
        .env_remove("PROCWARDEN_CONFIG_DIR")
        .env_remove("PROCWARDEN_LOG")
        .env_remove("PW_LOG")
        .env_remove("PW_LOG_FORMAT")
        .env_remove("RUST_LOG");
    cmd
}

/// Config with tiny hash costs so vault commands stay fast.
fn write_fast_config(dir: &Path) {
    std::fs::write(
        dir.join("config.json"),
        r#"{ "hash_parameters": { "memory_cost_cap": 64, "time_cost_cap": 1, "parallelism_cost_cap": 1 } }"#,
    )
    .unwrap();
}

// ============================================================================
// Arguments and version
// ============================================================================

mod args {
    use super::*;

    #[test]
    fn version_prints_name() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::starts_with("procwarden "));
    }

    #[test]
    fn unknown_command_is_args_error() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .arg("nonexistent-command")
            .assert()
            .code(10)
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn malformed_field_is_args_error() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["log", "write", "--type", "INFO", "--field", "no-equals-sign"])
            .assert()
            .code(10);
    }

    #[test]
    fn log_format_falls_back_to_env() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["-vv", "config", "show"])
            .env("PW_LOG_FORMAT", "jsonl")
            .assert()
            .success()
            .stderr(predicate::str::contains("\"message\":\"resolved paths\""));
    }

    #[test]
    fn unknown_log_format_is_args_error() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["--log-format", "xml", "version"])
            .assert()
            .code(10);
    }

    #[test]
    fn run_requires_a_command() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path()).arg("run").assert().code(10);
    }
}

// ============================================================================
// log
// ============================================================================

mod log {
    use super::*;

    #[test]
    fn write_then_show() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["log", "write", "--type", "info", "--field", "message=hello there"])
            .assert()
            .success()
            .stdout("1\n");

        procwarden(tmp.path())
            .args(["log", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Entry 1 :"))
            .stdout(predicate::str::contains("└── Type : INFO"))
            .stdout(predicate::str::contains("message : hello there"));
    }

    #[test]
    fn show_json_lines() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args([
                "log", "write", "--type", "EVENT", "--field", "event_name=up", "--field",
                "event_details=tun0",
            ])
            .assert()
            .success();

        let output = procwarden(tmp.path())
            .args(["log", "show", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let line = String::from_utf8(output.stdout).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["sequence"], 1);
        assert_eq!(value["log_type"], "EVENT");
    }

    #[test]
    fn missing_field_is_journal_error() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["log", "write", "--type", "EVENT", "--field", "event_name=up"])
            .assert()
            .code(13)
            .stderr(predicate::str::contains("event_details"));

        assert!(!tmp.path().join("log.txt").exists());
    }

    #[test]
    fn counters_and_flush() {
        let tmp = TempDir::new().unwrap();
        for i in 0..3 {
            procwarden(tmp.path())
                .args(["log", "write", "--type", "INFO"])
                .arg("--field")
                .arg(format!("message=m{}", i))
                .assert()
                .success();
        }

        procwarden(tmp.path())
            .args(["log", "flush", "--count", "1", "--inverse"])
            .assert()
            .success()
            .stdout("1\n");

        procwarden(tmp.path())
            .args(["log", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("message : m1"))
            .stdout(predicate::str::contains("message : m2").not());

        procwarden(tmp.path())
            .args(["log", "counters"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"entry_number\": 3"));
    }
}

// ============================================================================
// run
// ============================================================================

#[cfg(unix)]
mod run {
    use super::*;

    #[test]
    fn echo_is_mirrored_and_journaled() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["run", "--", "echo", "hi"])
            .assert()
            .success()
            .stdout(predicate::str::contains("STDOUT : hi"));

        let log = std::fs::read_to_string(tmp.path().join("log.txt")).unwrap();
        assert!(log.contains("line : hi"));
        assert!(log.contains("action : start process"));
        assert!(log.contains("action : stop process"));
    }

    #[test]
    fn no_echo_keeps_stdout_clean() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["run", "--no-echo", "--", "echo", "hi"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn failing_command_exit_code() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["run", "--", "sh", "-c", "exit 3"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("exit code 3"));
    }

    #[test]
    fn timeout_stops_command() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["run", "--timeout", "1", "--", "sleep", "30"])
            .timeout(std::time::Duration::from_secs(20))
            .assert()
            .code(22);
    }

    #[test]
    fn sudo_without_stored_secret_is_credential_error() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["run", "--sudo", "--", "true"])
            .assert()
            .code(12)
            .stderr(predicate::str::contains("escalation secret unavailable"));
    }

    #[test]
    fn missing_program_is_process_error() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["run", "--", "/nonexistent/procwarden-test-binary"])
            .assert()
            .code(23);
    }
}

// ============================================================================
// vault
// ============================================================================

mod vault {
    use super::*;

    #[test]
    fn set_verify_forget() {
        let tmp = TempDir::new().unwrap();
        write_fast_config(tmp.path());

        procwarden(tmp.path())
            .args(["vault", "set"])
            .write_stdin("hunter2\n")
            .assert()
            .success();

        procwarden(tmp.path())
            .args(["vault", "verify"])
            .write_stdin("hunter2\n")
            .assert()
            .code(0)
            .stdout("match\n");

        procwarden(tmp.path())
            .args(["vault", "verify"])
            .write_stdin("hunter3\n")
            .assert()
            .code(1)
            .stdout("no match\n");

        procwarden(tmp.path())
            .args(["vault", "forget"])
            .assert()
            .success()
            .stdout("removed\n");

        procwarden(tmp.path())
            .args(["vault", "verify"])
            .write_stdin("hunter2\n")
            .assert()
            .code(12);
    }

    #[test]
    fn tune_respects_caps() {
        let tmp = TempDir::new().unwrap();
        write_fast_config(tmp.path());
        procwarden(tmp.path())
            .args(["vault", "tune"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"memory_cost\": 64"))
            .stdout(predicate::str::contains("\"time_cost\": 1"))
            .stdout(predicate::str::contains("\"parallelism\": 1"));
    }
}

// ============================================================================
// config
// ============================================================================

mod config {
    use super::*;

    #[test]
    fn show_reports_sources() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"config_source\": \"CLI argument\""))
            .stdout(predicate::str::contains("\"entry_number\": 0"));
    }

    #[test]
    fn validate_accepts_defaults() {
        let tmp = TempDir::new().unwrap();
        procwarden(tmp.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("valid: "));
    }

    #[test]
    fn validate_rejects_inconsistent_counters() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.json"),
            r#"{ "log": { "entry_number": 1, "error_number": 5 } }"#,
        )
        .unwrap();
        procwarden(tmp.path())
            .args(["config", "validate"])
            .assert()
            .code(11);
    }

    #[test]
    fn invalid_json_is_config_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.json"), "{ not json").unwrap();
        procwarden(tmp.path())
            .args(["log", "counters"])
            .assert()
            .code(11);
    }
}
