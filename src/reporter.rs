use indicatif::{ProgressBar, ProgressStyle};
use shelfkeeper::{ScanReporter, ScanSummary};
use std::sync::Mutex;
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Spinner while listing, bar while resolving.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .progress_chars("━╸─")
        .tick_chars(TICK_CHARS)
}

impl ScanReporter for CliReporter {
    fn on_scan_start(&self, library_name: &str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(style("{spinner:.cyan} {msg}"));
        pb.set_message(format!("Listing {}...", library_name));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_scan_complete(&self, files_listed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Listing complete: {} files in {:.2}s",
            files_listed, duration_secs
        );
    }

    fn on_resolve_start(&self, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(style(
            "  {spinner:.cyan} Resolving [{bar:30.cyan/dim}] {pos}/{len} records",
        ));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_resolve_progress(&self, done: usize, total: usize) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                if pb.length() != Some(total as u64) {
                    pb.set_length(total as u64);
                }
                pb.set_position(done as u64);
            }
        }
    }

    fn on_resolve_complete(&self, summary: &ScanSummary) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Resolved: {} deleted, {} promoted, {} restored",
            summary.deleted, summary.promoted, summary.restored
        );
    }
}
