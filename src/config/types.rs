use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub pty: PtyConfig,
}

/// Execution engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Shell used for non-interactive commands (invoked as `<shell> -c <command>`).
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Program names that get a pseudo-terminal instead of pipes.
    #[serde(default = "default_interactive_programs")]
    pub interactive_programs: Vec<String>,
    /// Upper bound on how long the pump waits before re-checking stop/exit (default: 100).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Time between the termination signal and the kill signal (default: 300).
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// How long input may wait for the terminal to accept more bytes (default: 2000).
    #[serde(default = "default_input_timeout_ms")]
    pub input_timeout_ms: u64,
    /// Maximum bytes per PTY read (default: 1024).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Elapsed seconds at which the progress estimate saturates (default: 10).
    #[serde(default = "default_progress_horizon_secs")]
    pub progress_horizon_secs: f64,
    /// Cap on the accumulated output buffer (default: 1 MiB).
    #[serde(default = "default_scrollback_bytes")]
    pub scrollback_bytes: usize,
    /// Number of finished sessions kept in history (default: 100).
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

/// Pseudo-terminal settings for interactive sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtyConfig {
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_cols")]
    pub cols: u16,
    /// Value of `TERM` in the child environment.
    #[serde(default = "default_term")]
    pub term: String,
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_interactive_programs() -> Vec<String> {
    [
        "python", "python3", "ipython", "node", "mysql", "psql", "sqlite3", "irb",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_grace_period_ms() -> u64 {
    300
}

fn default_input_timeout_ms() -> u64 {
    2000
}

fn default_chunk_size() -> usize {
    1024
}

fn default_progress_horizon_secs() -> f64 {
    10.0
}

fn default_scrollback_bytes() -> usize {
    1_048_576
}

fn default_history_limit() -> usize {
    100
}

fn default_rows() -> u16 {
    24
}

fn default_cols() -> u16 {
    80
}

fn default_term() -> String {
    "dumb".to_string()
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            interactive_programs: default_interactive_programs(),
            poll_interval_ms: default_poll_interval_ms(),
            grace_period_ms: default_grace_period_ms(),
            input_timeout_ms: default_input_timeout_ms(),
            chunk_size: default_chunk_size(),
            progress_horizon_secs: default_progress_horizon_secs(),
            scrollback_bytes: default_scrollback_bytes(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            term: default_term(),
        }
    }
}
