//! Shared helpers for session integration tests.

#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};
use termexec::{Config, SessionController, SessionEvent};

/// Defaults with a short poll interval so tests finish quickly.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.engine.poll_interval_ms = 20;
    config.engine.grace_period_ms = 200;
    config
}

/// Drain events until the closing `Progress(1.0)` or `timeout`.
pub fn collect_until_final(controller: &SessionController, timeout: Duration) -> Vec<SessionEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while Instant::now() < deadline {
        if let Ok(event) = controller.next_event(Duration::from_millis(50)) {
            let done = event.is_final();
            events.push(event);
            if done {
                break;
            }
        }
    }
    events
}

/// Concatenated text of every `Output` event.
pub fn output_text(events: &[SessionEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Output(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// The single `Status` event, if exactly one was emitted.
pub fn status_of(events: &[SessionEvent]) -> Option<(bool, String)> {
    let statuses: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Status { success, message } => Some((*success, message.clone())),
            _ => None,
        })
        .collect();
    match statuses.as_slice() {
        [status] => Some(status.clone()),
        _ => None,
    }
}

/// Poll the accumulated output until it contains `needle`.
pub fn wait_for_output(controller: &SessionController, needle: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if controller.accumulated_output().contains(needle) {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

/// Whether `pid` still names a process (zombies included).
pub fn process_exists(pid: u32) -> bool {
    // SAFETY: signal 0 only performs the existence check.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// No event arrives within `window`.
pub fn stays_quiet(controller: &SessionController, window: Duration) -> bool {
    controller.next_event(window).is_err()
}

/// Whether `pid` is alive and not a zombie awaiting its reaper, waiting up
/// to `timeout` for it to go away.
pub fn still_running_after(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let zombie = std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let (_, rest) = stat.rsplit_once(')')?;
                rest.split_whitespace().next().map(|state| state == "Z")
            })
            .unwrap_or(false);
        if !process_exists(pid) || zombie {
            return false;
        }
        if Instant::now() >= deadline {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
}
