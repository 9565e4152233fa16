//! Ownership of one child process, plus signal and exit-check helpers.

use std::io;
use std::process::{Child, ExitStatus};

/// Exclusive ownership of a spawned child.
///
/// `exit_status` is set exactly once, by whichever of [`try_reap`] or
/// [`wait`] first observes the exit.
///
/// [`try_reap`]: ProcessHandle::try_reap
/// [`wait`]: ProcessHandle::wait
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    child: Child,
    exit_status: Option<ExitStatus>,
}

impl ProcessHandle {
    pub fn new(child: Child) -> Self {
        ProcessHandle {
            pid: child.id(),
            child,
            exit_status: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit status, once observed.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Non-blocking: reap the child if it has exited.
    pub fn try_reap(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.exit_status.is_none() {
            self.exit_status = self.child.try_wait()?;
        }
        Ok(self.exit_status)
    }

    /// Block until the child exits.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        match self.exit_status {
            Some(status) => Ok(status),
            None => {
                let status = self.child.wait()?;
                self.exit_status = Some(status);
                Ok(status)
            }
        }
    }

    /// Force-kill only the direct child (non-unix fallback and spawn cleanup).
    pub fn kill(&mut self) -> io::Result<()> {
        if self.exit_status.is_some() {
            return Ok(());
        }
        match self.child.kill() {
            Err(e) if e.kind() != io::ErrorKind::InvalidInput => Err(e),
            _ => Ok(()),
        }
    }
}

/// Signals used during termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Terminate,
    Kill,
}

/// Send `signal` to the process group led by `pid`. A group that is already
/// gone is not an error.
#[cfg(unix)]
pub fn signal_group(pid: u32, signal: StopSignal) -> io::Result<()> {
    let sig = match signal {
        StopSignal::Terminate => libc::SIGTERM,
        StopSignal::Kill => libc::SIGKILL,
    };
    let pgid = pid as libc::pid_t;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-pgid, sig) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

/// Whether `pid` (a child of this process) has exited, without reaping it.
///
/// A pid that is not a live child of ours (already reaped, or not a valid
/// child pid at all) counts as exited.
#[cfg(target_os = "linux")]
pub fn has_exited(pid: u32) -> bool {
    if pid == 0 {
        return true;
    }
    // SAFETY: siginfo_t is plain data; waitid fills it or leaves it zeroed.
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    let rc = unsafe {
        libc::waitid(
            libc::P_PID,
            pid as libc::id_t,
            &mut info,
            libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
        )
    };
    if rc != 0 {
        return matches!(
            io::Error::last_os_error().raw_os_error(),
            Some(libc::ECHILD) | Some(libc::EINVAL)
        );
    }
    // With WNOHANG, si_pid stays 0 while the child is still running.
    unsafe { info.si_pid() != 0 }
}

/// Elsewhere end-of-stream is taken as final.
#[cfg(not(target_os = "linux"))]
pub fn has_exited(_pid: u32) -> bool {
    true
}

/// Human-readable exit status ("exit code 0", "killed by signal 9").
pub fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return format!("killed by signal {}", sig);
        }
    }
    status.to_string()
}
