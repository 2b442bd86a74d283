//! Pre-launch command validation.

use std::path::PathBuf;

/// Result of inspecting a command line before launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCheck {
    /// First whitespace-delimited token.
    pub program: String,
    /// Where `program` resolves on `PATH`, if it does.
    pub resolved: Option<PathBuf>,
}

impl CommandCheck {
    /// Inspect `command`. Returns `None` for an empty or blank command.
    pub fn inspect(command: &str) -> Option<Self> {
        let program = command.split_whitespace().next()?.to_string();
        let resolved = which::which(&program).ok();
        Some(Self { program, resolved })
    }

    /// Whether the program was found. Shell builtins (`cd`, `export`, ...)
    /// are not on `PATH` but still run fine through the shell.
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

/// Split an interactive command into program and arguments.
///
/// Interactive commands bypass the shell, so this is a plain whitespace split
/// with no quoting rules.
pub fn split_argv(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_command_is_rejected() {
        assert!(CommandCheck::inspect("").is_none());
        assert!(CommandCheck::inspect(" \t ").is_none());
    }

    #[test]
    fn program_is_first_token() {
        let check = CommandCheck::inspect("  sh -c 'exit 0'").unwrap();
        assert_eq!(check.program, "sh");
        assert!(check.is_resolved());
    }

    #[test]
    fn unknown_program_is_unresolved() {
        let check = CommandCheck::inspect("definitely-not-a-real-binary-4711 --flag").unwrap();
        assert!(!check.is_resolved());
    }

    #[test]
    fn split_argv_ignores_extra_whitespace() {
        assert_eq!(
            split_argv("  python3   -q  -i "),
            vec!["python3".to_string(), "-q".to_string(), "-i".to_string()]
        );
    }
}
