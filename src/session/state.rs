use crate::error::EngineError;

/// Lifecycle of one session.
///
/// States only move forward within a session; `Terminated -> Idle` is the
/// reset taken when the controller is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Terminating = 3,
    Terminated = 4,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Terminated)
                | (Running, Terminating)
                | (Terminating, Terminated)
                | (Terminated, Idle)
        )
    }

    /// A session occupies the controller in these states.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Running | SessionState::Terminating
        )
    }

    pub(crate) fn advance(&mut self, next: SessionState) -> Result<(), EngineError> {
        if !self.can_transition_to(next) {
            return Err(EngineError::precondition(format!(
                "Invalid state transition from {:?} to {:?}",
                self, next
            )));
        }
        tracing::trace!(from = ?*self, to = ?next, "Session state transition");
        *self = next;
        Ok(())
    }
}
