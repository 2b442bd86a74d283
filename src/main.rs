use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crossterm::terminal::size as terminal_size;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use termexec::process::{AllowListClassifier, CommandCheck, InteractivityClassifier};
use termexec::{logging, Config, SessionController, SessionEvent};

const EVENT_POLL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "termexec", about = "Run shell commands and stream their output")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command and stream its output
    Run(RunArgs),
    /// Show how a command would be launched
    Check(RunArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Config file (defaults to the per-user config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Command line to execute
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[derive(Args)]
struct ConfigArgs {
    /// Config file (defaults to the per-user config)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();

    match cli.command {
        Commands::Run(args) => {
            let code = run(args)?;
            std::process::exit(code);
        }
        Commands::Check(args) => check(args),
        Commands::Config(args) => show_config(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Config::load().context("loading config"),
    }
}

/// Run one session to completion. Returns the process exit code to use.
fn run(args: RunArgs) -> Result<i32> {
    let mut config = load_config(args.config.as_ref())?;
    if io::stdout().is_terminal() {
        if let Ok((cols, rows)) = terminal_size() {
            if cols > 0 && rows > 0 {
                config.pty.cols = cols;
                config.pty.rows = rows;
            }
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context("registering signal handler")?;
    }

    let controller = Arc::new(SessionController::new(&config));
    let command = args.command.join(" ");
    if !controller.start(&command) {
        print_pending(&controller)?;
        return Ok(1);
    }

    if controller.is_interactive() {
        spawn_stdin_forwarder(Arc::clone(&controller));
    }

    let mut stdout = io::stdout();
    loop {
        if shutdown.swap(false, Ordering::SeqCst) {
            tracing::info!("Signal received, stopping session");
            controller.stop();
        }
        match controller.next_event(EVENT_POLL) {
            Ok(event) => {
                let done = event.is_final();
                print_event(&mut stdout, event)?;
                if done {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let code = controller
        .history()
        .last()
        .and_then(|record| record.return_code)
        .unwrap_or(1);
    Ok(code)
}

/// Forward stdin lines into the interactive session until either side ends.
fn spawn_stdin_forwarder(controller: Arc<SessionController>) {
    let spawned = thread::Builder::new()
        .name("stdin-forwarder".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if !controller.is_interactive() || !controller.send_input(&line) {
                    break;
                }
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "Failed to spawn stdin forwarder");
    }
}

fn print_event(stdout: &mut io::Stdout, event: SessionEvent) -> io::Result<()> {
    match event {
        SessionEvent::Output(text) => {
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
        SessionEvent::Progress(fraction) => {
            tracing::trace!(fraction, "Progress");
        }
        SessionEvent::Status { message, .. } => eprintln!("{}", message),
        SessionEvent::Error(message) => eprintln!("error: {}", message),
    }
    Ok(())
}

/// Print whatever a refused start left in the queue.
fn print_pending(controller: &SessionController) -> io::Result<()> {
    let mut stdout = io::stdout();
    while let Some(event) = controller.try_next_event() {
        print_event(&mut stdout, event)?;
    }
    Ok(())
}

fn check(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_ref())?;
    let command = args.command.join(" ");
    let Some(check) = CommandCheck::inspect(&command) else {
        bail!("Please enter a command");
    };
    let classifier = AllowListClassifier::new(config.engine.interactive_programs.iter().cloned());
    let mode = if classifier.is_interactive(&command) {
        "interactive (pseudo-terminal)".to_string()
    } else {
        format!("pipes ({} -c)", config.engine.shell)
    };

    println!("program:  {}", check.program);
    println!("mode:     {}", mode);
    match &check.resolved {
        Some(path) => println!("resolved: {}", path.display()),
        None => println!("resolved: not found on PATH (shell builtins still run)"),
    }
    Ok(())
}

fn show_config(args: ConfigArgs) -> Result<()> {
    let config = load_config(args.config.as_ref())?;
    let path = args.config.unwrap_or_else(Config::config_path);
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
