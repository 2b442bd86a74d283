use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::EngineError;
use crate::process::{AllowListClassifier, InteractivityClassifier, ProcessLauncher};
use crate::session::events::SessionEvent;
use crate::session::history::SessionRecord;
use crate::session::input::forward_input;
use crate::session::pump::{OutputPump, PumpSettings};
use crate::session::shared::{SessionInfo, Shared};
use crate::session::state::SessionState;
use crate::session::stop::StopSignal;

struct Worker {
    stop: StopSignal,
    thread: thread::JoinHandle<()>,
}

/// Runs one command at a time and streams its events.
///
/// All methods take `&self` and are safe to call from any thread while the
/// pump is running. Events are drained with [`next_event`](Self::next_event).
pub struct SessionController {
    launcher: ProcessLauncher,
    classifier: Arc<dyn InteractivityClassifier>,
    settings: PumpSettings,
    input_timeout: Duration,
    shared: Arc<Shared>,
    events: Mutex<Receiver<SessionEvent>>,
    worker: Mutex<Option<Worker>>,
}

impl SessionController {
    /// Controller using the configured interactive allow-list.
    pub fn new(config: &Config) -> Self {
        let classifier = AllowListClassifier::new(config.engine.interactive_programs.iter().cloned());
        Self::with_classifier(config, Arc::new(classifier))
    }

    pub fn with_classifier(config: &Config, classifier: Arc<dyn InteractivityClassifier>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            launcher: ProcessLauncher::new(config),
            classifier,
            settings: PumpSettings::from_config(&config.engine),
            input_timeout: config.engine.input_timeout(),
            shared: Arc::new(Shared::new(
                tx,
                config.engine.scrollback_bytes,
                config.engine.history_limit,
            )),
            events: Mutex::new(rx),
            worker: Mutex::new(None),
        }
    }

    /// Start `command`. Returns `false` if a session is already active or
    /// the command could not be started (details arrive as events).
    pub fn start(&self, command: &str) -> bool {
        match self.try_start(command) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "Start refused");
                false
            }
        }
    }

    pub fn try_start(&self, command: &str) -> Result<(), EngineError> {
        // Held for the whole start so a concurrent stop() sees the new worker.
        let mut worker = self.worker.lock();

        if self.shared.lock().state.is_active() {
            return Err(EngineError::precondition("A session is already running"));
        }
        let command = command.trim();
        if command.is_empty() {
            self.shared.emit_error("Please enter a command");
            return Err(EngineError::precondition("Command is empty"));
        }

        // The previous worker has already sealed its session; reap the thread.
        if let Some(previous) = worker.take() {
            let _ = previous.thread.join();
        }

        let interactive = self.classifier.is_interactive(command);
        let info = SessionInfo::new(command, interactive);
        let started = info.started;
        let span = tracing::info_span!("session", id = %info.id, interactive);
        let _entered = span.enter();
        self.shared.begin(info)?;
        tracing::info!(command, "Starting session");

        let launched = match self.launcher.launch(command, interactive) {
            Ok(launched) => launched,
            Err(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "Launch failed");
                self.shared.fail_start(&err);
                return Err(err);
            }
        };

        self.shared
            .mark_running(launched.process.pid(), launched.input)?;

        let stop = StopSignal::new();
        let pump = OutputPump::new(
            Arc::clone(&self.shared),
            stop.clone(),
            launched.process,
            launched.output,
            started,
            self.settings,
        );
        let pump_span = span.clone();
        let spawned = thread::Builder::new()
            .name("output-pump".to_string())
            .spawn(move || {
                let _entered = pump_span.enter();
                pump.run();
            });
        let thread = match spawned {
            Ok(thread) => thread,
            Err(err) => {
                // The unspawned closure took the ProcessHandle down with it,
                // which kills the child.
                self.shared
                    .abandon(&format!("Failed to spawn output pump: {}", err));
                return Err(EngineError::Io(err));
            }
        };

        *worker = Some(Worker { stop, thread });
        Ok(())
    }

    /// Send a line to the running interactive session.
    ///
    /// Returns `false` (and emits an `Error` event) when there is no
    /// interactive session or the write fails.
    pub fn send_input(&self, text: &str) -> bool {
        match self.try_send_input(text) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(kind = err.kind(), error = %err, "Input rejected");
                self.shared
                    .emit_error(format!("Failed to send input: {}", err));
                false
            }
        }
    }

    pub fn try_send_input(&self, text: &str) -> Result<(), EngineError> {
        forward_input(&self.shared, text, self.input_timeout)
    }

    /// Stop the running session and wait for its cleanup.
    ///
    /// Idempotent: with nothing running, or on a second call, this returns
    /// immediately without signalling anything.
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.stop.signal() {
            tracing::info!("Stop requested");
        }
        if worker.thread.join().is_err() {
            tracing::error!("Output pump thread panicked");
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_active()
    }

    pub fn is_interactive(&self) -> bool {
        self.shared.lock().interactive
    }

    /// Everything the current (or last) session produced, input echoes included.
    pub fn accumulated_output(&self) -> String {
        self.shared.lock().scrollback.as_str().to_string()
    }

    /// Command text of the current (or last) session.
    pub fn current_command(&self) -> Option<String> {
        self.shared.lock().current.as_ref().map(|info| info.command.clone())
    }

    /// Process id while the session is running.
    pub fn current_pid(&self) -> Option<u32> {
        self.shared.lock().pid
    }

    /// Finished sessions, oldest first.
    pub fn history(&self) -> Vec<SessionRecord> {
        self.shared.lock().history.records()
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_event(&self, timeout: Duration) -> Result<SessionEvent, RecvTimeoutError> {
        self.events.lock().recv_timeout(timeout)
    }

    pub fn try_next_event(&self) -> Option<SessionEvent> {
        self.events.lock().try_recv().ok()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}
