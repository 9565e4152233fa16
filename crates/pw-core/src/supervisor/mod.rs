//! Process supervisor: run one external command, stream its output into the
//! journal, and tear it down on request.
//!
//! The child runs in its own process group so termination reaches anything it
//! forks. Each output stream is drained by a dedicated thread; drains never
//! reap the child, only the supervisor does (see [`process::has_exited`]).
//!
//! Lifecycle:
//!
//! ```text
//! Idle --start--> Running --stop--> Stopping --> Stopped --start--> Running
//! ```

pub mod drain;
pub mod escalation;
pub mod process;

pub use drain::{DrainOptions, DrainReport};
pub use process::{describe_status, ProcessHandle, StopSignal};

use crate::journal::Journal;
use crate::vault::CredentialVault;
use drain::DrainTask;
use pw_common::{Error, LogType, Result, Secret, StreamName};
use std::fmt;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

const COMPONENT: &str = "supervisor";

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    /// Run through the escalation program.
    pub escalate: bool,
    /// Overrides the vault's remembered secret.
    pub secret: Option<Secret>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec {
            argv: argv.into_iter().map(Into::into).collect(),
            escalate: false,
            secret: None,
        }
    }

    pub fn escalated(mut self) -> Self {
        self.escalate = true;
        self
    }

    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Command line as logged. Never contains the secret.
    pub fn display(&self) -> String {
        escalation::display_command(&self.argv)
    }
}

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub escalation_program: String,
    /// Mirror each output line to our stdout as `STREAM : line`.
    pub echo_to_console: bool,
    /// Time between SIGTERM and SIGKILL.
    pub term_grace: Duration,
    /// Bound on waiting for drain threads after the child is gone.
    pub drain_join_timeout: Duration,
    pub poll_interval: Duration,
    /// Recorded in COMMAND entries.
    pub invoker: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            escalation_program: "sudo".to_string(),
            echo_to_console: true,
            term_grace: Duration::from_secs(2),
            drain_join_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            invoker: "procwarden".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
            SupervisorState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Owns at most one running child at a time.
#[derive(Debug)]
pub struct ProcessSupervisor {
    journal: Arc<Journal>,
    vault: Option<Arc<CredentialVault>>,
    config: SupervisorConfig,
    state: SupervisorState,
    handle: Option<ProcessHandle>,
    command: String,
    drains: Vec<DrainTask>,
    cancel: Arc<AtomicBool>,
    reports: Vec<DrainReport>,
    last_exit: Option<ExitStatus>,
}

impl ProcessSupervisor {
    pub fn new(journal: Arc<Journal>, config: SupervisorConfig) -> Self {
        ProcessSupervisor {
            journal,
            vault: None,
            config,
            state: SupervisorState::Idle,
            handle: None,
            command: String::new(),
            drains: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            reports: Vec::new(),
            last_exit: None,
        }
    }

    /// Source of the escalation secret when a spec carries none.
    pub fn with_vault(mut self, vault: Arc<CredentialVault>) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(ProcessHandle::pid)
    }

    pub fn is_running(&self) -> bool {
        self.state == SupervisorState::Running
    }

    /// Per-stream line counts of the last completed run.
    pub fn drain_reports(&self) -> &[DrainReport] {
        &self.reports
    }

    /// Exit status of the last completed run.
    pub fn last_exit(&self) -> Option<ExitStatus> {
        self.last_exit
    }

    /// Spawn `spec` and start draining its output. Returns the pid.
    #[instrument(skip(self, spec), fields(command = %spec.display(), escalate = spec.escalate))]
    pub fn start(&mut self, spec: CommandSpec) -> Result<u32> {
        if let (SupervisorState::Running, Some(pid)) = (self.state, self.pid()) {
            return Err(self.fail(Error::AlreadyRunning { pid }, "start"));
        }
        // A finished run rests in Idle; a failed start leaves it there.
        if self.state == SupervisorState::Stopped {
            self.state = SupervisorState::Idle;
        }

        let shown = spec.display();
        if spec.argv.is_empty() {
            return Err(self.fail(
                Error::Spawn {
                    command: shown,
                    message: "empty command".to_string(),
                },
                "start",
            ));
        }

        let requires_sudo = spec.escalate.to_string();
        if let Err(e) = self.journal.write(
            LogType::Command,
            [
                ("command", shown.as_str()),
                ("requires_sudo", requires_sudo.as_str()),
                ("invoker", self.config.invoker.as_str()),
            ],
        ) {
            warn!(error = %e, "failed to journal command");
        }

        let secret = if spec.escalate {
            Some(self.escalation_secret(spec.secret)?)
        } else {
            None
        };

        let argv = if spec.escalate {
            escalation::wrap(&self.config.escalation_program, &spec.argv)
        } else {
            spec.argv
        };

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(if secret.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| {
            self.fail(
                Error::Spawn {
                    command: shown.clone(),
                    message: e.to_string(),
                },
                "start",
            )
        })?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut handle = ProcessHandle::new(child);
        let pid = handle.pid();

        if let (Some(secret), Some(stdin)) = (secret.as_ref(), stdin) {
            if let Err(e) = escalation::deliver_secret(stdin, secret) {
                abort_child(&mut handle);
                return Err(self.fail(
                    Error::Spawn {
                        command: shown,
                        message: format!("failed to deliver secret: {}", e),
                    },
                    "start",
                ));
            }
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let options = DrainOptions {
            echo_to_console: self.config.echo_to_console,
            poll_interval: self.config.poll_interval,
        };
        let mut drains = Vec::with_capacity(2);
        let mut drain_error = None;
        for (stream, reader) in [
            (StreamName::Stdout, stdout.map(|r| Box::new(r) as Box<dyn std::io::Read + Send>)),
            (StreamName::Stderr, stderr.map(|r| Box::new(r) as Box<dyn std::io::Read + Send>)),
        ] {
            let spawned = match reader {
                Some(reader) => drain::spawn(
                    stream,
                    reader,
                    pid,
                    self.journal.clone(),
                    cancel.clone(),
                    options.clone(),
                ),
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    format!("{} pipe missing", stream),
                )),
            };
            match spawned {
                Ok(task) => drains.push(task),
                Err(e) => {
                    drain_error = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = drain_error {
            abort_child(&mut handle);
            cancel.store(true, Ordering::SeqCst);
            for task in drains {
                let _ = task.handle.join();
            }
            return Err(self.fail(
                Error::Spawn {
                    command: shown,
                    message: format!("failed to start output drain: {}", e),
                },
                "start",
            ));
        }

        self.log_action("start process", "start", &format!("pid {} : {}", pid, shown));
        info!(pid, command = %shown, "process started");

        self.handle = Some(handle);
        self.command = shown;
        self.drains = drains;
        self.cancel = cancel;
        self.reports.clear();
        self.last_exit = None;
        self.state = SupervisorState::Running;
        Ok(pid)
    }

    /// Non-blocking exit check for the running child.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        match self.handle.as_mut() {
            Some(handle) => handle.try_reap().map_err(Error::from),
            None => Err(self.fail(Error::NotRunning, "try_wait")),
        }
    }

    /// Wait for the child to exit on its own. `None` means the timeout
    /// elapsed first; the child is left running.
    pub fn wait_for_exit(&mut self, timeout: Option<Duration>) -> Result<Option<ExitStatus>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Terminate the child if needed, then collect its drains.
    ///
    /// Calling `stop` with nothing running is a no-op returning `None`.
    #[instrument(skip(self))]
    pub fn stop(&mut self) -> Result<Option<ExitStatus>> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(None);
        };
        self.state = SupervisorState::Stopping;
        let pid = handle.pid();
        let command = std::mem::take(&mut self.command);

        let exited_early = match handle.try_reap() {
            Ok(status) => status,
            Err(e) => {
                debug!(pid, error = %e, "exit check failed, terminating anyway");
                None
            }
        };

        let outcome = match exited_early {
            Some(status) => Ok((status, "exited")),
            None => self.terminate(&mut handle),
        };

        match outcome {
            Ok((status, how)) => {
                self.log_action(
                    "stop process",
                    "stop",
                    &format!("pid {} {} ({})", pid, how, describe_status(status)),
                );
                if exited_early.is_some() && !status.success() {
                    let message = format!("`{}` {}", command, describe_status(status));
                    if let Err(e) = self
                        .journal
                        .write(LogType::CommandError, [("error", message.as_str())])
                    {
                        warn!(error = %e, "failed to journal command error");
                    }
                }
                self.join_drains(pid);
                self.last_exit = Some(status);
                self.state = SupervisorState::Stopped;
                info!(pid, status = %describe_status(status), "process stopped");
                Ok(Some(status))
            }
            Err(e) => {
                self.log_action("stop process", "stop", &format!("pid {} failed: {}", pid, e));
                self.join_drains(pid);
                self.state = SupervisorState::Stopped;
                Err(self.fail(
                    Error::Termination {
                        pid,
                        message: e.to_string(),
                    },
                    "stop",
                ))
            }
        }
    }

    /// SIGTERM, grace period, then SIGKILL.
    #[cfg(unix)]
    fn terminate(&self, handle: &mut ProcessHandle) -> std::io::Result<(ExitStatus, &'static str)> {
        let pid = handle.pid();
        process::signal_group(pid, StopSignal::Terminate)?;
        let deadline = Instant::now() + self.config.term_grace;
        loop {
            if let Some(status) = handle.try_reap()? {
                return Ok((status, "terminated"));
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(self.config.poll_interval.min(deadline - now));
        }
        warn!(pid, grace = ?self.config.term_grace, "process ignored SIGTERM, killing");
        process::signal_group(pid, StopSignal::Kill)?;
        Ok((handle.wait()?, "killed"))
    }

    #[cfg(not(unix))]
    fn terminate(&self, handle: &mut ProcessHandle) -> std::io::Result<(ExitStatus, &'static str)> {
        handle.kill()?;
        Ok((handle.wait()?, "killed"))
    }

    /// Cancel and join both drains within `drain_join_timeout`.
    ///
    /// Drains still blocked after the bound (a descendant holding the pipe
    /// open) get the group killed once more and a second bound; whatever is
    /// left after that is detached.
    fn join_drains(&mut self, pid: u32) {
        self.cancel.store(true, Ordering::SeqCst);
        let timeout = self.config.drain_join_timeout;

        if !self.wait_drains(timeout) {
            warn!(pid, ?timeout, "output drains still busy, killing process group");
            #[cfg(unix)]
            {
                if let Err(e) = process::signal_group(pid, StopSignal::Kill) {
                    warn!(pid, error = %e, "failed to kill process group");
                }
            }
            self.wait_drains(timeout);
        }

        for task in self.drains.drain(..) {
            if !task.is_finished() {
                warn!(pid, stream = %task.stream, "detaching unfinished output drain");
                continue;
            }
            match task.handle.join() {
                Ok(Ok(report)) => self.reports.push(report),
                Ok(Err(e)) => debug!(stream = %task.stream, error = %e, "drain ended with error"),
                Err(_) => warn!(stream = %task.stream, "output drain panicked"),
            }
        }
    }

    fn wait_drains(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.drains.iter().all(DrainTask::is_finished) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    fn escalation_secret(&self, explicit: Option<Secret>) -> Result<Secret> {
        let secret = match explicit {
            Some(secret) => Some(secret),
            None => match &self.vault {
                Some(vault) => vault.escalation_secret()?,
                None => None,
            },
        };
        match secret {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(self.fail(
                Error::CredentialUnavailable {
                    reason: "no escalation secret stored".to_string(),
                },
                "start",
            )),
        }
    }

    fn log_action(&self, action: &str, operation: &str, output: &str) {
        let invoker = format!("component : {}\noperation : {}", COMPONENT, operation);
        if let Err(e) = self.journal.write(
            LogType::Action,
            [
                ("action", action),
                ("invoker", invoker.as_str()),
                ("output", output),
            ],
        ) {
            warn!(action, error = %e, "failed to journal action");
        }
    }

    fn fail(&self, err: Error, operation: &str) -> Error {
        self.journal
            .report(err, &format!("{}::{}", COMPONENT, operation))
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "failed to stop process on drop");
        }
    }
}

/// Best-effort teardown of a child that never became Running.
fn abort_child(handle: &mut ProcessHandle) {
    #[cfg(unix)]
    let killed = process::signal_group(handle.pid(), StopSignal::Kill);
    #[cfg(not(unix))]
    let killed = handle.kill();
    if let Err(e) = killed.and_then(|_| handle.wait().map(|_| ())) {
        warn!(pid = handle.pid(), error = %e, "failed to clean up child");
    }
}
