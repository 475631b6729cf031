//! Operator interaction capability
//!
//! The orchestrator calls a `Prompter` at its defined checkpoints (device
//! pick, artifact pick, flash confirmation, version-skew acknowledgment).
//! The terminal implementation uses `inquire`; tests substitute a scripted
//! responder so the state machine runs unattended.

use inquire::{Confirm, Select, Text};

use crate::error::Result;

pub trait Prompter {
    /// Yes/no checkpoint
    fn confirm(&mut self, message: &str, default: bool) -> Result<bool>;

    /// Pick one entry from an ordered list; `None` means the operator backed
    /// out without choosing.
    fn select(&mut self, title: &str, items: &[String]) -> Result<Option<usize>>;

    /// Free-text entry; `None` means the operator backed out.
    fn input(&mut self, message: &str) -> Result<Option<String>>;
}

/// Interactive prompter backed by the terminal
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, message: &str, default: bool) -> Result<bool> {
        let answer = Confirm::new(message)
            .with_default(default)
            .with_help_message("Press Enter to accept the default")
            .prompt()?;
        Ok(answer)
    }

    fn select(&mut self, title: &str, items: &[String]) -> Result<Option<usize>> {
        let Some(choice) = Select::new(title, items.to_vec())
            .with_starting_cursor(0)
            .with_page_size(10)
            .without_filtering()
            .with_help_message("↑↓ to move, ENTER to select, ESC to cancel")
            .raw_prompt_skippable()?
        else {
            return Ok(None);
        };
        Ok(Some(choice.index))
    }

    fn input(&mut self, message: &str) -> Result<Option<String>> {
        let answer = Text::new(message).prompt_skippable()?;
        Ok(answer.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
    }
}
