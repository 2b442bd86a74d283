//! Session state shared between the controller and its pump worker.

use parking_lot::{Mutex, MutexGuard};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

use crate::error::EngineError;
use crate::process::InputChannel;
use crate::session::events::SessionEvent;
use crate::session::history::{SessionHistory, SessionRecord};
use crate::session::scrollback::Scrollback;
use crate::session::state::SessionState;

/// Identity of the session currently owned by the controller.
#[derive(Debug, Clone)]
pub(crate) struct SessionInfo {
    pub id: Uuid,
    pub command: String,
    pub interactive: bool,
    pub started_at: SystemTime,
    pub started: Instant,
}

impl SessionInfo {
    pub fn new(command: &str, interactive: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: command.to_string(),
            interactive,
            started_at: SystemTime::now(),
            started: Instant::now(),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Outcome {
    pub return_code: Option<i32>,
    pub stopped: bool,
}

pub(crate) struct Inner {
    pub state: SessionState,
    pub current: Option<SessionInfo>,
    pub interactive: bool,
    pub pid: Option<u32>,
    pub scrollback: Scrollback,
    pub history: SessionHistory,
    /// Set once `Status` is out; later Output/Progress are dropped.
    sealed: bool,
    last_progress: f64,
}

impl Inner {
    pub fn push_output(&mut self, tx: &Sender<SessionEvent>, text: String) {
        if self.sealed || text.is_empty() {
            return;
        }
        self.scrollback.append(&text);
        let _ = tx.send(SessionEvent::Output(text));
    }

    /// Session-scoped error; dropped once the session is sealed.
    pub fn push_error(&mut self, tx: &Sender<SessionEvent>, message: String) {
        if self.sealed {
            tracing::debug!(error = %message, "Dropping error reported after session end");
            return;
        }
        let _ = tx.send(SessionEvent::Error(message));
    }
}

pub(crate) struct Shared {
    inner: Mutex<Inner>,
    /// Write side of an interactive session, locked apart from `inner` so a
    /// slow write never stalls the output pump. Never taken while `inner`
    /// is held.
    input: Mutex<Option<InputChannel>>,
    tx: Sender<SessionEvent>,
}

impl Shared {
    pub fn new(tx: Sender<SessionEvent>, scrollback_bytes: usize, history_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                current: None,
                interactive: false,
                pid: None,
                scrollback: Scrollback::new(scrollback_bytes),
                history: SessionHistory::new(history_limit),
                sealed: true,
                last_progress: 0.0,
            }),
            input: Mutex::new(None),
            tx,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock()
    }

    pub fn input(&self) -> MutexGuard<'_, Option<InputChannel>> {
        self.input.lock()
    }

    pub fn sender(&self) -> &Sender<SessionEvent> {
        &self.tx
    }

    pub fn emit_output(&self, text: String) {
        self.inner.lock().push_output(&self.tx, text);
    }

    /// Emit a progress estimate, clamped below 1.0 and never decreasing.
    pub fn emit_progress(&self, fraction: f64) {
        let mut inner = self.inner.lock();
        if inner.sealed {
            return;
        }
        let fraction = fraction.clamp(0.0, 0.99).max(inner.last_progress);
        inner.last_progress = fraction;
        let _ = self.tx.send(SessionEvent::Progress(fraction));
    }

    /// Error caused by a caller request. Delivered whatever the session state.
    pub fn emit_error(&self, message: impl Into<String>) {
        let _ = self.tx.send(SessionEvent::Error(message.into()));
    }

    /// Error raised by the session's own workers. Nothing follows
    /// `Progress(1.0)`, so these are dropped once the session is sealed.
    pub fn emit_session_error(&self, message: impl Into<String>) {
        self.inner.lock().push_error(&self.tx, message.into());
    }

    /// Claim the controller for a new session: `{Idle, Terminated} -> Starting`.
    pub fn begin(&self, info: SessionInfo) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.state.is_active() {
            return Err(EngineError::precondition(format!(
                "A session is already {:?}",
                inner.state
            )));
        }
        if inner.state == SessionState::Terminated {
            inner.state.advance(SessionState::Idle)?;
        }
        inner.state.advance(SessionState::Starting)?;
        inner.scrollback.clear();
        inner.sealed = false;
        inner.last_progress = 0.0;
        inner.interactive = info.interactive;
        inner.pid = None;
        inner.current = Some(info);
        Ok(())
    }

    pub fn mark_running(&self, pid: u32, input: Option<InputChannel>) -> Result<(), EngineError> {
        *self.input.lock() = input;
        let mut inner = self.inner.lock();
        if let Err(err) = inner.state.advance(SessionState::Running) {
            drop(inner);
            self.input.lock().take();
            return Err(err);
        }
        inner.pid = Some(pid);
        Ok(())
    }

    /// `Running -> Terminating`. A write in progress sees the new state and
    /// gives up, releasing the input channel.
    pub fn begin_termination(&self) {
        let mut inner = self.inner.lock();
        if let Err(err) = inner.state.advance(SessionState::Terminating) {
            tracing::debug!(error = %err, "Termination already in progress");
        }
    }

    /// Take the input channel so the caller decides when its descriptor
    /// closes. Waits for a write in progress to finish.
    pub fn close_input(&self) -> Option<InputChannel> {
        self.input.lock().take()
    }

    /// Launch failed: report it and go straight to `Terminated`.
    pub fn fail_start(&self, err: &EngineError) {
        self.emit_error(err.to_string());
        self.complete(
            Outcome {
                return_code: None,
                stopped: false,
            },
            Some(err),
        );
    }

    /// Emit the final `Status` and `Progress(1.0)`, record history, move to
    /// `Terminated`. Idempotent.
    pub fn finish(&self, outcome: Outcome) {
        self.complete(outcome, None);
    }

    /// Last-resort completion when the pump dies unexpectedly.
    pub fn abandon(&self, reason: &str) {
        tracing::error!(reason, "Abandoning session");
        self.emit_error(reason.to_string());
        self.finish(Outcome {
            return_code: None,
            stopped: false,
        });
    }

    fn complete(&self, outcome: Outcome, launch_error: Option<&EngineError>) {
        if self.seal(outcome, launch_error) {
            // Normally already closed by the pump; this covers abandonment.
            drop(self.close_input());
        }
    }

    /// Emit the closing events and record the session. Returns `false` if
    /// the session was already sealed.
    fn seal(&self, outcome: Outcome, launch_error: Option<&EngineError>) -> bool {
        let mut inner = self.inner.lock();
        if inner.sealed {
            return false;
        }
        let Some(info) = inner.current.clone() else {
            return false;
        };
        let elapsed = info.started.elapsed();
        let message = match launch_error {
            Some(err) => format!("Command failed to start: {}", err),
            None => status_message(info.interactive, outcome, elapsed),
        };
        let success = launch_error.is_none() && outcome.return_code == Some(0);

        let _ = self.tx.send(SessionEvent::Status { success, message });
        let _ = self.tx.send(SessionEvent::Progress(1.0));
        inner.sealed = true;
        inner.last_progress = 1.0;
        inner.interactive = false;
        inner.pid = None;

        let next = SessionState::Terminated;
        if let Err(err) = inner.state.advance(next) {
            tracing::warn!(error = %err, "Forcing session to Terminated");
            inner.state = next;
        }

        inner.history.push(SessionRecord {
            id: info.id,
            command: info.command,
            interactive: info.interactive,
            started_at: info.started_at,
            return_code: outcome.return_code,
            elapsed,
            stopped: outcome.stopped,
        });
        tracing::info!(
            return_code = ?outcome.return_code,
            stopped = outcome.stopped,
            elapsed_ms = elapsed.as_millis() as u64,
            "Session terminated"
        );
        true
    }
}

/// Human-readable summary carried by the final `Status` event.
pub(crate) fn status_message(interactive: bool, outcome: Outcome, elapsed: Duration) -> String {
    let code = match outcome.return_code {
        Some(code) => code.to_string(),
        None => "unknown".to_string(),
    };
    if interactive {
        return format!("Interactive session ended (Return code: {})", code);
    }
    let verb = if outcome.stopped {
        "terminated"
    } else {
        "completed"
    };
    format!(
        "Command {} (Return code: {})\nExecution time: {:.2} seconds",
        verb,
        code,
        elapsed.as_secs_f64()
    )
}
