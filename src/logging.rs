use tracing_subscriber::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming the log destination.
pub const LOG_ENV: &str = "TERMEXEC_LOG";

/// Initialize tracing with optional file output.
///
/// Logging is off unless `TERMEXEC_LOG` is set. `TERMEXEC_LOG=stderr` logs to
/// stderr; any other value is a file path, made unique per run as
/// `{path}.{timestamp}.{pid}`. The level filter comes from `RUST_LOG` and
/// defaults to `info`.
pub fn init_tracing() {
    let Some(target) = std::env::var(LOG_ENV).ok().filter(|v| !v.is_empty()) else {
        // Session output goes to stdout, keep it clean by default
        return;
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if target == "stderr" {
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true);
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .try_init();
        return;
    }

    let unique_path = unique_log_path(&target);
    let Ok(file) = std::fs::File::create(&unique_path) else {
        eprintln!("Warning: Failed to create log file: {}", unique_path);
        return;
    };

    let file_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init();
}

/// `{path}.{timestamp}.{pid}`, so concurrent runs never share a file.
fn unique_log_path(path: &str) -> String {
    let pid = std::process::id();
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{}.{}.{}", path, timestamp, pid)
}
