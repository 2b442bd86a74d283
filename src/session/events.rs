use std::fmt;

/// One item on the session event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Decoded output, in the order the child produced it (per stream).
    Output(String),
    /// Liveness estimate in `0.0..=1.0`; `1.0` is the last event of a session.
    Progress(f64),
    /// Final outcome. Always followed by exactly one `Progress(1.0)`.
    Status { success: bool, message: String },
    /// Something went wrong; the session still ends with a `Status`.
    Error(String),
}

impl SessionEvent {
    pub fn is_status(&self) -> bool {
        matches!(self, SessionEvent::Status { .. })
    }

    /// Whether this is the terminal `Progress(1.0)`.
    pub fn is_final(&self) -> bool {
        matches!(self, SessionEvent::Progress(p) if *p >= 1.0)
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Output(text) => write!(f, "{}", text),
            SessionEvent::Progress(p) => write!(f, "{:.0}%", p * 100.0),
            SessionEvent::Status { success, message } => {
                let mark = if *success { "ok" } else { "failed" };
                write!(f, "[{}] {}", mark, message)
            }
            SessionEvent::Error(message) => write!(f, "error: {}", message),
        }
    }
}
