use crossterm::style::Stylize;

use crate::args::OutputMode;

/// Human-facing progress output. Everything goes to stderr so that stdout
/// only carries command results, and nothing is printed in JSON mode.
#[derive(Clone, Copy)]
pub struct Ui {
    is_human: bool,
}

impl Ui {
    pub fn new(output_mode: OutputMode) -> Self {
        let is_human = !matches!(output_mode, OutputMode::Json);
        Self { is_human }
    }

    pub fn is_human(&self) -> bool {
        self.is_human
    }

    pub fn header(&self, title: &str) {
        if self.is_human() {
            eprintln!();
            eprintln!("{} {}", "WeDeploy".blue().bold(), format!("• {}", title).bold());
        }
    }

    pub fn step<M: AsRef<str>>(&self, emoji: &str, message: M) {
        if self.is_human() {
            eprintln!("  {} {}", emoji, message.as_ref());
        }
    }

    pub fn info<M: AsRef<str>>(&self, message: M) {
        if self.is_human() {
            eprintln!("   {}", message.as_ref());
        }
    }

    pub fn success<M: AsRef<str>>(&self, message: M) {
        if self.is_human() {
            eprintln!("   {}", message.as_ref().green());
        }
    }

    pub fn warn<M: AsRef<str>>(&self, message: M) {
        if self.is_human() {
            eprintln!("   ⚠️  {}", message.as_ref().yellow());
        }
    }

    pub fn error<M: AsRef<str>>(&self, message: M) {
        if self.is_human() {
            eprintln!("   {}", message.as_ref().red());
        }
    }
}
