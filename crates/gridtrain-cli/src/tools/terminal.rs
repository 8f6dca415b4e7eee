//! Thin wrapper over cliclack so commands share one look.

use cliclack::ProgressBar;
use colored::Colorize;

#[derive(Debug, Clone, Default)]
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    pub fn command_title(&self, title: &str) {
        let _ = cliclack::intro(title.bold().to_string());
    }

    pub fn print(&self, message: &str) {
        let _ = cliclack::log::info(message);
    }

    pub fn print_success(&self, message: &str) {
        let _ = cliclack::log::success(message);
    }

    pub fn print_warning(&self, message: &str) {
        let _ = cliclack::log::warning(message);
    }

    pub fn print_err(&self, message: &str) {
        let _ = cliclack::log::error(message);
    }

    pub fn spinner(&self) -> ProgressBar {
        cliclack::spinner()
    }

    pub fn confirm(&self, prompt: &str) -> std::io::Result<bool> {
        cliclack::confirm(prompt).interact()
    }

    pub fn finalize(&self, message: &str) {
        let _ = cliclack::outro(message);
    }

    pub fn cancel_finalize(&self, message: &str) {
        let _ = cliclack::outro_cancel(message);
    }
}
