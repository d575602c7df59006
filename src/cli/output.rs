//! CLI output formatting utilities.

use crate::poller::{ProgressEvent, ProgressSink, StatusLevel};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a tool's text result.
    pub fn block(text: &str) {
        println!("\n{}\n", text);
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(spinner_style);
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Shows tool progress on a terminal spinner.
///
/// Status lines replace the spinner message; media messages and citations
/// are printed above it.
pub struct SpinnerSink {
    bar: ProgressBar,
}

impl SpinnerSink {
    pub fn new(msg: &str) -> Self {
        Self {
            bar: Output::spinner(msg),
        }
    }
}

impl ProgressSink for SpinnerSink {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Status {
                status: StatusLevel::InProgress,
                description,
                ..
            } => self.bar.set_message(description),
            ProgressEvent::Status {
                status: StatusLevel::Success,
                description,
                ..
            } => {
                self.bar.finish_and_clear();
                Output::success(&description);
            }
            ProgressEvent::Status { description, .. } => {
                self.bar.finish_and_clear();
                Output::error(&description);
            }
            ProgressEvent::Message { content } => self.bar.suspend(|| println!("{}", content)),
            ProgressEvent::Citation { title, url, .. } => {
                self.bar.suspend(|| Output::kv(&title, &url))
            }
        }
    }
}

impl Drop for SpinnerSink {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
