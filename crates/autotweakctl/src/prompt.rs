//! Yes/no confirmation

use console::{style, Term};

/// Asks the operator before an optional change
pub trait Confirm {
    fn confirm(&self, question: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, question: &str) -> bool {
        self(question)
    }
}

/// Prompts on stderr; answers no when stdin is not a terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt {
    assume_yes: bool,
}

impl TerminalPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Confirm for TerminalPrompt {
    fn confirm(&self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }

        let term = Term::stderr();
        if !term.is_term() {
            return false;
        }

        if term
            .write_str(&format!("{} [y/N]: ", style(question).bold()))
            .is_err()
        {
            return false;
        }
        term.read_line().map(|a| is_yes(&a)).unwrap_or(false)
    }
}

/// `y` or `yes`, case-insensitive
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES\n"));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn test_assume_yes_skips_terminal() {
        assert!(TerminalPrompt::new(true).confirm("Disable cups.service?"));
    }

    #[test]
    fn test_closure_confirm() {
        let only_cups = |q: &str| q.contains("cups");
        assert!(only_cups.confirm("Disable cups.service?"));
        assert!(!only_cups.confirm("Disable bluetooth.service?"));
    }
}
