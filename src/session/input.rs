//! Forwarding caller text into a running interactive session.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::error::EngineError;
use crate::process::InputChannel;
use crate::pty::wait_writable;
use crate::session::shared::Shared;
use crate::session::state::SessionState;

/// Marker prepended to echoed input in the output transcript.
pub const INPUT_ECHO_PREFIX: &str = ">>> ";

/// Longest single wait for writability before the session state is rechecked.
const WRITE_WAIT_SLICE: Duration = Duration::from_millis(50);

/// Write one line to the session's PTY master.
///
/// The echo is recorded before the write so it precedes any reply. Only the
/// input lock is held while writing, so the pump keeps draining output. The
/// write fails once the terminal accepts nothing for `timeout`, or when the
/// session starts terminating.
pub(crate) fn forward_input(shared: &Shared, text: &str, timeout: Duration) -> Result<(), EngineError> {
    let line = if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{}\n", text)
    };

    let mut input = shared.input();
    let mut inner = shared.lock();
    if inner.state != SessionState::Running || !inner.interactive {
        return Err(EngineError::precondition(
            "No interactive session is running",
        ));
    }
    let Some(channel) = input.as_mut() else {
        return Err(EngineError::precondition("Session input is closed"));
    };
    inner.push_output(shared.sender(), format!("{}{}", INPUT_ECHO_PREFIX, line));
    drop(inner);

    write_all_ready(shared, channel, line.as_bytes(), timeout)?;
    Ok(())
}

/// `write_all` for a non-blocking descriptor. On `WouldBlock` it waits for
/// writability; every accepted byte restarts the `timeout`.
fn write_all_ready(
    shared: &Shared,
    channel: &mut InputChannel,
    mut bytes: &[u8],
    timeout: Duration,
) -> io::Result<()> {
    let mut deadline = Instant::now() + timeout;
    while !bytes.is_empty() {
        match channel.writer.write(bytes) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "terminal accepted no input",
                ))
            }
            Ok(count) => {
                bytes = &bytes[count..];
                deadline = Instant::now() + timeout;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if shared.lock().state != SessionState::Running {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "session ended before input was delivered",
                    ));
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "terminal stopped accepting input",
                    ));
                }
                wait_writable(channel.fd, remaining.min(WRITE_WAIT_SLICE))?;
            }
            Err(err) => return Err(err),
        }
    }
    channel.writer.flush()
}
