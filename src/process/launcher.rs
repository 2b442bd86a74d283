use portable_pty::CommandBuilder;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use crate::config::Config;
use crate::error::EngineError;
use crate::process::command::split_argv;
use crate::process::handle::{
    ChildProcess, InputChannel, OutputStreams, PipeStreams, ProcessHandle, PtyStreams,
};
use crate::pty::PtyAllocator;

/// A freshly started child with its streams.
pub struct Launched {
    pub process: ProcessHandle,
    pub output: OutputStreams,
    /// Present only for interactive (PTY) sessions.
    pub input: Option<InputChannel>,
}

/// Starts children either on a pseudo-terminal or behind a shell with pipes.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    shell: String,
    term: String,
    allocator: PtyAllocator,
}

impl ProcessLauncher {
    pub fn new(config: &Config) -> Self {
        Self {
            shell: config.engine.shell.clone(),
            term: config.pty.term.clone(),
            allocator: PtyAllocator::new(&config.pty),
        }
    }

    pub fn launch(&self, command: &str, interactive: bool) -> Result<Launched, EngineError> {
        if interactive {
            self.launch_pty(command)
        } else {
            self.launch_piped(command)
        }
    }

    /// Program runs directly on the slave side, in its own session.
    fn launch_pty(&self, command: &str) -> Result<Launched, EngineError> {
        let argv = split_argv(command);
        let Some((program, args)) = argv.split_first() else {
            return Err(EngineError::precondition("Command is empty"));
        };
        let program_path = which::which(program).map_err(|e| EngineError::launch(command, e))?;
        let cwd = std::env::current_dir().map_err(|e| EngineError::launch(command, e))?;

        let pair = self.allocator.allocate()?;

        let mut cmd = CommandBuilder::new(program_path);
        cmd.args(args);
        cmd.cwd(cwd);
        cmd.env("TERM", &self.term);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| EngineError::launch(command, e))?;
        // Parent must not hold the slave, or EOF is never seen on the master.
        drop(pair.slave);

        // Reap the child if anything below fails.
        let child = scopeguard::guard(child, |mut child| {
            let _ = child.kill();
            let _ = child.wait();
        });

        let pid = child
            .process_id()
            .ok_or_else(|| EngineError::launch(command, "child has no process id"))?;
        let master = pair.master;
        let fd = master
            .as_raw_fd()
            .ok_or_else(|| EngineError::Allocation("PTY master has no file descriptor".to_string()))?;
        let reader = master
            .try_clone_reader()
            .map_err(|e| EngineError::Allocation(e.to_string()))?;
        let writer = master
            .take_writer()
            .map_err(|e| EngineError::Allocation(e.to_string()))?;

        let child = scopeguard::ScopeGuard::into_inner(child);
        tracing::info!(pid, program = %program, "Spawned interactive process on PTY");

        Ok(Launched {
            process: ProcessHandle::new(pid, ChildProcess::Pty(child)),
            output: OutputStreams::Pty(PtyStreams { master, reader, fd }),
            input: Some(InputChannel { writer, fd }),
        })
    }

    /// `<shell> -c <command>` with separate stdout/stderr pipes, in a new group.
    fn launch_piped(&self, command: &str) -> Result<Launched, EngineError> {
        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|e| EngineError::launch(command, e))?;

        let mut child = scopeguard::guard(child, |mut child| {
            let _ = child.kill();
            let _ = child.wait();
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Allocation("stdout pipe missing".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Allocation("stderr pipe missing".to_string()))?;

        let child = scopeguard::ScopeGuard::into_inner(child);
        let pid = child.id();
        tracing::info!(pid, shell = %self.shell, "Spawned shell command with pipes");

        Ok(Launched {
            process: ProcessHandle::new(pid, ChildProcess::Piped(child)),
            output: OutputStreams::Pipes(PipeStreams { stdout, stderr }),
            input: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn piped_launch_separates_streams() {
        let launcher = ProcessLauncher::new(&Config::default());
        let mut launched = launcher
            .launch("echo out; echo err 1>&2", false)
            .unwrap();
        assert!(launched.input.is_none());

        let OutputStreams::Pipes(mut pipes) = launched.output else {
            panic!("expected pipes");
        };
        let mut out = String::new();
        let mut err = String::new();
        pipes.stdout.read_to_string(&mut out).unwrap();
        pipes.stderr.read_to_string(&mut err).unwrap();
        assert_eq!(out, "out\n");
        assert_eq!(err, "err\n");
        assert_eq!(launched.process.wait().unwrap(), 0);
    }

    #[test]
    fn piped_child_leads_its_own_group() {
        let launcher = ProcessLauncher::new(&Config::default());
        let mut launched = launcher.launch("sleep 1", false).unwrap();
        let pid = launched.process.pid() as libc::pid_t;
        let pgid = unsafe { libc::getpgid(pid) };
        assert_eq!(pgid, pid);
        launched
            .process
            .terminate(std::time::Duration::from_millis(200))
            .unwrap();
    }

    #[test]
    fn missing_shell_is_launch_error() {
        let mut config = Config::default();
        config.engine.shell = "/nonexistent/shell".to_string();
        let launcher = ProcessLauncher::new(&config);
        match launcher.launch("true", false) {
            Err(EngineError::Launch { command, .. }) => assert_eq!(command, "true"),
            Err(other) => panic!("expected launch error, got {other}"),
            Ok(_) => panic!("expected launch error"),
        }
    }

    #[test]
    fn unknown_interactive_program_is_launch_error() {
        let launcher = ProcessLauncher::new(&Config::default());
        let result = launcher.launch("definitely-not-a-real-binary-4711", true);
        assert!(matches!(result, Err(EngineError::Launch { .. })));
    }

    #[test]
    fn pty_launch_provides_input_channel() {
        let launcher = ProcessLauncher::new(&Config::default());
        let mut launched = launcher.launch("cat", true).unwrap();
        assert!(launched.input.is_some());
        assert!(matches!(launched.output, OutputStreams::Pty(_)));
        launched
            .process
            .terminate(std::time::Duration::from_millis(200))
            .unwrap();
    }
}
