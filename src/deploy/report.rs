//! Console reporting for a deployment run.

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};

/// Receives the human-readable progress of a deployment.
pub trait Reporter: Send {
    fn info(&mut self, message: &str);
    fn warn(&mut self, message: &str);
    fn error(&mut self, message: &str);

    /// Raw text captured from a remote stream.
    fn output(&mut self, text: &str);

    /// Progress bar for the archive upload. Hidden unless overridden.
    fn upload_progress(&mut self) -> ProgressBar {
        ProgressBar::hidden()
    }
}

/// Prints status lines to stdout, one glyph per severity.
pub struct ConsoleReporter {
    term: Term,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn info(&mut self, message: &str) {
        tracing::debug!("{}", message);
        println!("  {} {}", style("✓").green().bold(), message);
    }

    fn warn(&mut self, message: &str) {
        tracing::debug!("{}", message);
        println!("  {} {}", style("!").yellow().bold(), style(message).yellow());
    }

    fn error(&mut self, message: &str) {
        tracing::debug!("{}", message);
        println!("  {} {}", style("✕").red().bold(), style(message).red());
    }

    fn output(&mut self, text: &str) {
        for line in text.lines() {
            println!("    {}", style(line).dim());
        }
    }

    fn upload_progress(&mut self) -> ProgressBar {
        if !self.term.is_term() {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(0);
        let template = "    {bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
        bar.set_style(
            ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
        bar
    }
}
