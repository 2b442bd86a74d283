//! Background worker that moves child output onto the event channel.

use std::io::{self, BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::process::{OutputStreams, PipeStreams, ProcessHandle, PtyStreams};
use crate::pty::wait_readable;
use crate::session::decode::Utf8Decoder;
use crate::session::shared::{Outcome, Shared};
use crate::session::stop::StopSignal;

/// Prefix for lines read from the child's stderr.
pub const STDERR_PREFIX: &str = "ERROR: ";

/// Reads per wakeup before re-checking stop and exit.
const MAX_READS_PER_WAKEUP: usize = 64;

#[derive(Debug, Clone, Copy)]
pub(crate) struct PumpSettings {
    pub poll_interval: Duration,
    pub grace: Duration,
    pub chunk_size: usize,
    pub horizon_secs: f64,
}

impl PumpSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            grace: config.grace_period(),
            chunk_size: config.chunk_size,
            horizon_secs: config.progress_horizon_secs,
        }
    }
}

/// Saturating liveness estimate: `min(0.99, elapsed / horizon)`.
pub fn progress_for(elapsed: Duration, horizon_secs: f64) -> f64 {
    (elapsed.as_secs_f64() / horizon_secs).min(0.99)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadProgress {
    Pending,
    Eof,
}

pub(crate) struct OutputPump {
    shared: Arc<Shared>,
    stop: StopSignal,
    process: ProcessHandle,
    output: OutputStreams,
    started: Instant,
    settings: PumpSettings,
}

impl OutputPump {
    pub fn new(
        shared: Arc<Shared>,
        stop: StopSignal,
        process: ProcessHandle,
        output: OutputStreams,
        started: Instant,
        settings: PumpSettings,
    ) -> Self {
        Self {
            shared,
            stop,
            process,
            output,
            started,
            settings,
        }
    }

    /// Pump until exit or stop, then run cleanup. Always ends the session.
    pub fn run(self) {
        let OutputPump {
            shared,
            stop,
            mut process,
            output,
            started,
            settings,
        } = self;

        let _abandon = scopeguard::guard_on_unwind(Arc::clone(&shared), |shared| {
            shared.abandon("Output pump panicked");
        });

        let ctx = PumpContext {
            shared,
            stop,
            started,
            settings,
        };
        let outcome = match output {
            OutputStreams::Pty(streams) => ctx.run_pty(&mut process, streams),
            OutputStreams::Pipes(pipes) => ctx.run_pipes(&mut process, pipes),
        };
        ctx.shared.finish(outcome);
    }
}

struct PumpContext {
    shared: Arc<Shared>,
    stop: StopSignal,
    started: Instant,
    settings: PumpSettings,
}

impl PumpContext {
    fn emit_progress(&self) {
        self.shared
            .emit_progress(progress_for(self.started.elapsed(), self.settings.horizon_secs));
    }

    fn run_pty(&self, process: &mut ProcessHandle, mut streams: PtyStreams) -> Outcome {
        let mut decoder = Utf8Decoder::default();
        let mut buf = vec![0u8; self.settings.chunk_size];

        let eof = match self.pty_loop(process, &mut streams, &mut buf, &mut decoder) {
            Ok(progress) => progress == ReadProgress::Eof,
            Err(err) => {
                tracing::warn!(error = %err, "PTY read failed");
                self.shared.emit_session_error(format!("Error reading output: {}", err));
                false
            }
        };

        self.shared.begin_termination();
        let return_code = self.terminate(process);
        let input = self.shared.close_input();

        if !eof {
            if let Err(err) = read_available(&mut streams.reader, &mut buf, &mut decoder, &self.shared)
            {
                tracing::warn!(error = %err, "Final PTY drain failed");
                self.shared.emit_session_error(format!("Error reading output: {}", err));
            }
        }
        self.shared.emit_output(decoder.finish());

        // Writer first, then master and reader.
        drop(input);
        drop(streams);

        Outcome {
            return_code,
            stopped: self.stop.is_requested(),
        }
    }

    fn pty_loop(
        &self,
        process: &mut ProcessHandle,
        streams: &mut PtyStreams,
        buf: &mut [u8],
        decoder: &mut Utf8Decoder,
    ) -> io::Result<ReadProgress> {
        loop {
            if self.stop.is_requested() || process.try_wait()?.is_some() {
                return Ok(ReadProgress::Pending);
            }
            if wait_readable(streams.fd, self.settings.poll_interval)?
                && read_available(&mut streams.reader, buf, decoder, &self.shared)?
                    == ReadProgress::Eof
            {
                return Ok(ReadProgress::Eof);
            }
            self.emit_progress();
        }
    }

    fn run_pipes(&self, process: &mut ProcessHandle, pipes: PipeStreams) -> Outcome {
        let (done_tx, done_rx) = mpsc::channel();
        let mut readers = 0;
        let streams: [(&'static str, &'static str, Box<dyn Read + Send>); 2] = [
            ("stdout", "", Box::new(pipes.stdout)),
            ("stderr", STDERR_PREFIX, Box::new(pipes.stderr)),
        ];
        for (name, prefix, stream) in streams {
            match spawn_line_reader(name, prefix, stream, Arc::clone(&self.shared), done_tx.clone()) {
                Ok(()) => readers += 1,
                Err(err) => {
                    tracing::error!(stream = name, error = %err, "Failed to spawn reader thread");
                    self.shared
                        .emit_session_error(format!("Failed to read {}: {}", name, err));
                }
            }
        }
        drop(done_tx);

        if let Err(err) = self.pipe_loop(process) {
            tracing::warn!(error = %err, "Exit check failed");
            self.shared.emit_session_error(format!("Error waiting for process: {}", err));
        }

        self.shared.begin_termination();
        let return_code = self.terminate(process);
        self.drain_readers(&done_rx, readers);

        Outcome {
            return_code,
            stopped: self.stop.is_requested(),
        }
    }

    fn pipe_loop(&self, process: &mut ProcessHandle) -> io::Result<()> {
        loop {
            if self.stop.is_requested() || process.try_wait()?.is_some() {
                return Ok(());
            }
            self.emit_progress();
            self.stop.wait_timeout(self.settings.poll_interval);
        }
    }

    /// Wait for both readers to hit EOF. The group is already swept, so a
    /// reader still blocked after the grace period has its pipe held by a
    /// process that left the group; it is abandoned and its late output is
    /// dropped by the sealed emitter.
    fn drain_readers(&self, done: &Receiver<()>, readers: usize) {
        let remaining = readers - wait_for_readers(done, readers, self.settings.grace);
        if remaining > 0 {
            tracing::warn!(remaining, "Abandoning output readers");
        }
    }

    /// Terminate (if still alive) and reap, then clear out any group
    /// members the leader left behind.
    fn terminate(&self, process: &mut ProcessHandle) -> Option<i32> {
        let return_code = match process.terminate(self.settings.grace) {
            Ok(code) => Some(code),
            Err(err) => {
                tracing::error!(pid = process.pid(), error = %err, "Failed to terminate process");
                self.shared
                    .emit_session_error(format!("Failed to terminate process: {}", err));
                process.return_code()
            }
        };
        match process.sweep_group(self.settings.grace) {
            Ok(true) => {
                tracing::info!(pgid = process.pgid(), "Terminated leftover process group members")
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(pgid = process.pgid(), error = %err, "Failed to sweep process group")
            }
        }
        return_code
    }
}

/// Non-blocking read of everything currently available.
///
/// `WouldBlock` means no data yet; `EIO` on a PTY master means the slave
/// side closed, i.e. end-of-stream.
fn read_available<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
    decoder: &mut Utf8Decoder,
    shared: &Shared,
) -> io::Result<ReadProgress> {
    for _ in 0..MAX_READS_PER_WAKEUP {
        match reader.read(buf) {
            Ok(0) => return Ok(ReadProgress::Eof),
            Ok(count) => shared.emit_output(decoder.decode(&buf[..count])),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                return Ok(ReadProgress::Pending)
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.raw_os_error() == Some(libc::EIO) => {
                tracing::trace!("PTY slave closed");
                return Ok(ReadProgress::Eof);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(ReadProgress::Pending)
}

fn spawn_line_reader(
    name: &'static str,
    prefix: &'static str,
    stream: Box<dyn Read + Send>,
    shared: Arc<Shared>,
    done: Sender<()>,
) -> io::Result<()> {
    thread::Builder::new()
        .name(format!("{}-reader", name))
        .spawn(move || {
            let mut reader = BufReader::new(stream);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line);
                        shared.emit_output(format!("{}{}", prefix, text));
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        tracing::warn!(stream = name, error = %err, "Pipe read failed");
                        shared.emit_session_error(format!("Error reading {}: {}", name, err));
                        break;
                    }
                }
            }
            let _ = done.send(());
        })?;
    Ok(())
}

/// Wait up to `timeout` for `expected` reader completions; returns how many arrived.
fn wait_for_readers(done: &Receiver<()>, expected: usize, timeout: Duration) -> usize {
    let deadline = Instant::now() + timeout;
    let mut finished = 0;
    while finished < expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match done.recv_timeout(remaining) {
            Ok(()) => finished += 1,
            Err(_) => break,
        }
    }
    finished
}
