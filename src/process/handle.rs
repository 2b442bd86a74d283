use portable_pty::MasterPty;
use std::io::{self, Read, Write};
use std::os::unix::io::RawFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{ChildStderr, ChildStdout};
use std::thread;
use std::time::{Duration, Instant};

const EXIT_POLL_STEP: Duration = Duration::from_millis(10);

/// The OS child behind a session.
pub enum ChildProcess {
    Pty(Box<dyn portable_pty::Child + Send + Sync>),
    Piped(std::process::Child),
}

/// Output side of a launched process.
pub enum OutputStreams {
    Pty(PtyStreams),
    Pipes(PipeStreams),
}

/// PTY master kept by the parent. Dropping it closes the master descriptors.
pub struct PtyStreams {
    pub master: Box<dyn MasterPty + Send>,
    pub reader: Box<dyn Read + Send>,
    pub fd: RawFd,
}

pub struct PipeStreams {
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Write side of an interactive session.
pub struct InputChannel {
    pub writer: Box<dyn Write + Send>,
    /// Descriptor sharing the writer's file description, used for readiness waits.
    pub fd: RawFd,
}

/// Owns the child process and its process group.
pub struct ProcessHandle {
    pid: u32,
    pgid: libc::pid_t,
    child: ChildProcess,
    return_code: Option<i32>,
    signals_sent: u32,
}

impl ProcessHandle {
    /// `pid` must lead its own process group (launched with `setsid` or
    /// `process_group(0)`).
    pub fn new(pid: u32, child: ChildProcess) -> Self {
        Self {
            pid,
            pgid: pid as libc::pid_t,
            child,
            return_code: None,
            signals_sent: 0,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn pgid(&self) -> libc::pid_t {
        self.pgid
    }

    /// Number of group signals actually delivered.
    pub fn signals_sent(&self) -> u32 {
        self.signals_sent
    }

    /// Return code, if the child has already been reaped.
    pub fn return_code(&self) -> Option<i32> {
        self.return_code
    }

    /// Non-blocking exit check. Caches the return code once reaped.
    pub fn try_wait(&mut self) -> io::Result<Option<i32>> {
        if let Some(code) = self.return_code {
            return Ok(Some(code));
        }
        let code = match &mut self.child {
            ChildProcess::Pty(child) => child.try_wait()?.map(|s| s.exit_code() as i32),
            ChildProcess::Piped(child) => child.try_wait()?.map(exit_code_of),
        };
        self.return_code = code;
        Ok(code)
    }

    /// Block until the child exits.
    pub fn wait(&mut self) -> io::Result<i32> {
        if let Some(code) = self.return_code {
            return Ok(code);
        }
        let code = match &mut self.child {
            ChildProcess::Pty(child) => child.wait()?.exit_code() as i32,
            ChildProcess::Piped(child) => exit_code_of(child.wait()?),
        };
        self.return_code = Some(code);
        Ok(code)
    }

    /// Send `signal` to the whole process group.
    ///
    /// Returns `Ok(false)` when the group no longer exists.
    pub fn signal_group(&mut self, signal: libc::c_int) -> io::Result<bool> {
        // SAFETY: plain syscall, no pointers involved.
        let rc = unsafe { libc::killpg(self.pgid, signal) };
        if rc == 0 {
            self.signals_sent += 1;
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            tracing::debug!(pgid = self.pgid, signal, "Process group already gone");
            return Ok(false);
        }
        Err(err)
    }

    /// Graceful-then-forceful termination of the process group.
    ///
    /// Does nothing but reap if the child has already exited.
    pub fn terminate(&mut self, grace: Duration) -> io::Result<i32> {
        if let Some(code) = self.try_wait()? {
            return Ok(code);
        }

        tracing::debug!(pid = self.pid, "Sending SIGTERM to process group");
        self.signal_group(libc::SIGTERM)?;

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(code) = self.try_wait()? {
                return Ok(code);
            }
            thread::sleep(EXIT_POLL_STEP);
        }

        if let Some(code) = self.try_wait()? {
            return Ok(code);
        }
        tracing::info!(pid = self.pid, grace_ms = grace.as_millis() as u64, "Grace period elapsed, killing process group");
        self.signal_group(libc::SIGKILL)?;
        self.wait()
    }

    /// Terminate whatever is left of the process group once the leader has
    /// been reaped, escalating to SIGKILL after `grace`.
    ///
    /// Returns `Ok(false)` when the group was already empty.
    pub fn sweep_group(&mut self, grace: Duration) -> io::Result<bool> {
        if !self.signal_group(libc::SIGTERM)? {
            return Ok(false);
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.group_exists()? {
                return Ok(true);
            }
            thread::sleep(EXIT_POLL_STEP);
        }
        tracing::debug!(pgid = self.pgid, "Group members survived SIGTERM, killing");
        self.signal_group(libc::SIGKILL)?;
        Ok(true)
    }

    fn group_exists(&self) -> io::Result<bool> {
        // SAFETY: signal 0 only checks for existence.
        if unsafe { libc::killpg(self.pgid, 0) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(false);
        }
        Err(err)
    }
}

impl Drop for ProcessHandle {
    /// A handle dropped without being reaped takes its process group down.
    fn drop(&mut self) {
        if self.return_code.is_some() {
            return;
        }
        if let Ok(Some(_)) = self.try_wait() {
            return;
        }
        tracing::warn!(pid = self.pid, "Dropping live process handle, killing process group");
        if let Err(err) = self.signal_group(libc::SIGKILL) {
            tracing::warn!(pid = self.pid, error = %err, "Failed to kill process group");
            return;
        }
        let _ = self.wait();
    }
}

/// Shell convention: a signal-terminated child reports `128 + signo`.
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}
