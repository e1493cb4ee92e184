//! Terminal progress bars for downloads and uploads.
//!
//! Every transfer gets its own bar under one `MultiProgress`. Log lines are
//! written through the same `MultiProgress` so they print above the bars
//! instead of tearing them.

use std::io::{self, Write};

use buccotiles::config::format_size;
use buccotiles::download::{ProgressReporter, TransferProgress};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

const BAR_TEMPLATE: &str =
    "{prefix:>16} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})";
const SPINNER_TEMPLATE: &str = "{prefix:>16} [{elapsed_precise}] {spinner:.green} {bytes}";

/// Draws one bar per transfer.
#[derive(Clone)]
pub struct TerminalProgress {
    multi: MultiProgress,
}

impl TerminalProgress {
    /// Bars on stderr, hidden when stderr is not a terminal.
    pub fn new() -> Self {
        let target = if console::Term::stderr().is_term() {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Self {
            multi: MultiProgress::with_draw_target(target),
        }
    }

    /// Writer for log lines that keeps the bars intact.
    pub fn log_writer(&self) -> LogWriter {
        LogWriter {
            multi: self.multi.clone(),
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_style(total_bytes: u64) -> ProgressStyle {
    let template = if total_bytes > 0 {
        BAR_TEMPLATE
    } else {
        SPINNER_TEMPLATE
    };
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

impl ProgressReporter for TerminalProgress {
    fn start(&self, label: &str, total_bytes: u64) -> Box<dyn TransferProgress> {
        let bar = if total_bytes > 0 {
            ProgressBar::new(total_bytes)
        } else {
            ProgressBar::new_spinner()
        };
        bar.set_style(bar_style(total_bytes));
        bar.set_prefix(label.to_string());
        Box::new(TerminalTransfer {
            bar: self.multi.add(bar),
            label: label.to_string(),
        })
    }
}

struct TerminalTransfer {
    bar: ProgressBar,
    label: String,
}

impl TransferProgress for TerminalTransfer {
    fn advance(&mut self, bytes: u64) {
        self.bar.inc(bytes);
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
        tracing::debug!(transfer = %self.label, size = %format_size(self.bar.position()), "transfer done");
    }
}

/// `MakeWriter` printing to stderr above the progress bars.
#[derive(Clone)]
pub struct LogWriter {
    multi: MultiProgress,
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = SuspendingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendingWriter {
            multi: self.multi.clone(),
        }
    }
}

/// Hides the bars while a log line is written.
pub struct SuspendingWriter {
    multi: MultiProgress,
}

impl Write for SuspendingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden() -> TerminalProgress {
        TerminalProgress {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    #[test]
    fn test_transfer_advances_its_bar() {
        let progress = hidden();
        let bar = progress.multi.add(ProgressBar::new(1000));
        let mut transfer = TerminalTransfer {
            bar: bar.clone(),
            label: "CYP-ADM0".to_string(),
        };
        transfer.advance(400);
        transfer.advance(100);
        assert_eq!(bar.position(), 500);
        transfer.finish();
        assert!(bar.is_finished());
    }

    #[test]
    fn test_unknown_size_uses_spinner() {
        let progress = hidden();
        let mut transfer = progress.start("CYP.gpkg.zip", 0);
        transfer.advance(64 * 1024);
        transfer.finish();
    }

    #[test]
    fn test_log_writer_passes_bytes_through() {
        let progress = hidden();
        let writer = progress.log_writer();
        let mut w = writer.make_writer();
        assert_eq!(w.write(b"").unwrap(), 0);
        assert!(w.flush().is_ok());
    }
}
