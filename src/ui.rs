//! Terminal output and prompts
//!
//! Status lines are crossterm-styled and go to stdout; diagnostics go through
//! `tracing` to stderr. All questions are asked through [`Prompter`] so steps
//! can be driven by [`ScriptedPrompter`] in tests.

use crate::error::{InstallError, Result};
use crossterm::style::Stylize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub const SUCCESS_SYMBOL: &str = "✓";
pub const ERROR_SYMBOL: &str = "✗";
pub const WARNING_SYMBOL: &str = "!";
pub const INFO_SYMBOL: &str = "i";
pub const PROGRESS_SYMBOL: &str = "→";

/// Characters of file content shown in a dry-run write preview
const PREVIEW_CHARS: usize = 300;

// =============================================================================
// Status lines
// =============================================================================

/// Program banner
pub fn header(dry_run: bool) {
    let rule = "═".repeat(60);
    println!("{}", rule.as_str().magenta());
    println!("{}", "  archstep: Arch Linux step-by-step installer".magenta().bold());
    println!("{}", rule.as_str().magenta());
    if dry_run {
        println!(
            "{}",
            format!("{} DRY RUN MODE: no disk, package or file changes will be made", WARNING_SYMBOL)
                .yellow()
                .bold()
        );
    }
    println!();
}

/// Section title for a step
pub fn section(title: &str) {
    println!();
    println!("{}", format!("── {} ", title).blue().bold());
}

pub fn step_info(message: &str) {
    println!("{} {}", PROGRESS_SYMBOL.blue(), message);
}

pub fn success(message: &str) {
    println!("{} {}", SUCCESS_SYMBOL.green(), message.green());
}

pub fn warn(message: &str) {
    println!("{} {}", WARNING_SYMBOL.yellow(), message.yellow());
}

pub fn error(message: &str) {
    eprintln!("{} {}", ERROR_SYMBOL.red().bold(), message.red().bold());
}

pub fn info(message: &str) {
    println!("{} {}", INFO_SYMBOL.cyan(), message.cyan());
}

/// `label: value` row of a summary table
pub fn key_value(label: &str, value: &str) {
    println!("  {} {}", format!("{}:", label).dark_cyan(), value.cyan());
}

/// Echo of a command a dry run skips
pub fn dry_run_command(command: &str) {
    println!("{} Would execute: {}", "[DRY RUN]".yellow().bold(), command);
}

/// Echo of a command about to run
pub fn command_info(command: &str) {
    println!("{} {}", "Executing:".dark_grey(), command.dark_grey());
}

/// Dry-run preview of a file write, truncated to the first few hundred chars
pub fn write_preview(path: &str, content: &str) {
    dry_run_command(&format!("write to {}", path));
    println!("{}", format!("--BEGIN CONTENT for {}--", path).dark_yellow());
    println!("{}", truncate_preview(content));
    println!("{}", format!("--END CONTENT for {}--", path).dark_yellow());
}

fn truncate_preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Spinner that ticks on its own thread until `finish_and_clear`
pub fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// =============================================================================
// Prompts
// =============================================================================

/// Interactive questions asked during an install
pub trait Prompter {
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
    fn input(&self, prompt: &str, default: &str) -> Result<String>;
    /// Index into `items`
    fn select(&self, prompt: &str, items: &[String]) -> Result<usize>;
    /// Secret entry, confirmed by typing it twice
    fn password(&self, prompt: &str) -> Result<String>;
}

/// dialoguer prompts on the controlling terminal
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Ok(dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }

    fn input(&self, prompt: &str, default: &str) -> Result<String> {
        Ok(dialoguer::Input::<String>::new()
            .with_prompt(prompt)
            .default(default.to_string())
            .interact_text()?)
    }

    fn select(&self, prompt: &str, items: &[String]) -> Result<usize> {
        Ok(dialoguer::Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact()?)
    }

    fn password(&self, prompt: &str) -> Result<String> {
        Ok(dialoguer::Password::new()
            .with_prompt(prompt)
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()?)
    }
}

/// A queued answer for [`ScriptedPrompter`]
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Yes,
    No,
    Text(String),
    Choice(usize),
}

/// Answers prompts from a queue; falls back to each prompt's default when empty
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<Answer>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Every prompt shown so far, in order
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn next(&self, prompt: &str) -> Result<Option<Answer>> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(prompt.to_string());
        }
        let mut answers = self
            .answers
            .lock()
            .map_err(|_| InstallError::config("scripted answers poisoned"))?;
        Ok(answers.pop_front())
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        match self.next(prompt)? {
            None => Ok(default),
            Some(Answer::Yes) => Ok(true),
            Some(Answer::No) => Ok(false),
            Some(other) => Err(InstallError::config(format!(
                "expected yes/no for '{}', got {:?}",
                prompt, other
            ))),
        }
    }

    fn input(&self, prompt: &str, default: &str) -> Result<String> {
        match self.next(prompt)? {
            None => Ok(default.to_string()),
            Some(Answer::Text(text)) => Ok(text),
            Some(other) => Err(InstallError::config(format!(
                "expected text for '{}', got {:?}",
                prompt, other
            ))),
        }
    }

    fn select(&self, prompt: &str, items: &[String]) -> Result<usize> {
        match self.next(prompt)? {
            None => Ok(0),
            Some(Answer::Choice(i)) if i < items.len() => Ok(i),
            Some(other) => Err(InstallError::config(format!(
                "invalid selection for '{}': {:?}",
                prompt, other
            ))),
        }
    }

    fn password(&self, prompt: &str) -> Result<String> {
        match self.next(prompt)? {
            Some(Answer::Text(text)) => Ok(text),
            None => Err(InstallError::config(format!(
                "no scripted password for '{}'",
                prompt
            ))),
            Some(other) => Err(InstallError::config(format!(
                "expected password for '{}', got {:?}",
                prompt, other
            ))),
        }
    }
}
