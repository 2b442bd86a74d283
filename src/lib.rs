//! Command execution engine.
//!
//! Runs one shell command at a time, either over pipes or (for known
//! interactive programs) on a pseudo-terminal, and reports what happens as a
//! stream of [`SessionEvent`]s: output text, progress, a final status and
//! errors. Interactive sessions accept input lines through
//! [`SessionController::send_input`].

pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod pty;
pub mod session;

pub use config::Config;
pub use error::EngineError;
pub use session::{SessionController, SessionEvent, SessionState};
