//! Launching and owning child processes.

mod classifier;
mod command;
mod handle;
mod launcher;

pub use classifier::{AllowListClassifier, InteractivityClassifier};
pub use command::{split_argv, CommandCheck};
pub use handle::{
    ChildProcess, InputChannel, OutputStreams, PipeStreams, ProcessHandle, PtyStreams,
};
pub use launcher::{Launched, ProcessLauncher};
