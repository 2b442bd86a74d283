//! Interactivity classification: decides PTY vs. pipes for a command line.

use std::collections::HashSet;
use std::path::Path;

/// Decides whether a command needs a pseudo-terminal.
///
/// The engine only sees this trait, so the allow-list below can be swapped
/// for a smarter strategy without touching the launcher or the controller.
pub trait InteractivityClassifier: Send + Sync {
    fn is_interactive(&self, command: &str) -> bool;
}

/// Matches the basename of the first whitespace-delimited token against a
/// fixed set of program names.
#[derive(Debug, Clone)]
pub struct AllowListClassifier {
    programs: HashSet<String>,
}

impl AllowListClassifier {
    pub fn new<I, S>(programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            programs: programs.into_iter().map(Into::into).collect(),
        }
    }
}

impl InteractivityClassifier for AllowListClassifier {
    fn is_interactive(&self, command: &str) -> bool {
        let Some(first) = command.split_whitespace().next() else {
            return false;
        };
        let name = Path::new(first)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(first);
        self.programs.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> AllowListClassifier {
        AllowListClassifier::new(["python3", "node", "mysql"])
    }

    #[test]
    fn matches_first_token_only() {
        let c = classifier();
        assert!(c.is_interactive("python3"));
        assert!(c.is_interactive("  node --inspect"));
        assert!(!c.is_interactive("echo python3"));
    }

    #[test]
    fn matches_basename_of_path() {
        assert!(classifier().is_interactive("/usr/bin/python3 -q"));
    }

    #[test]
    fn requires_exact_name() {
        let c = classifier();
        assert!(!c.is_interactive("python3-config --libs"));
        assert!(!c.is_interactive("nodejs"));
    }

    #[test]
    fn empty_command_is_not_interactive() {
        assert!(!classifier().is_interactive(""));
        assert!(!classifier().is_interactive("   "));
    }
}
