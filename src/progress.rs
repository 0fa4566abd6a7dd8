use crate::engine::ScanSummary;

/// Trait for reporting reconciliation progress.
///
/// The CLI implements it with indicatif; all methods default to no-ops.
pub trait ScanReporter: Send + Sync {
    fn on_scan_start(&self, _library_name: &str) {}
    fn on_scan_complete(&self, _files_listed: usize, _duration_secs: f64) {}
    fn on_resolve_start(&self, _total: usize) {}
    fn on_resolve_progress(&self, _done: usize, _total: usize) {}
    fn on_resolve_complete(&self, _summary: &ScanSummary) {}
}

/// No-op reporter for silent operation.
pub struct SilentReporter;

impl ScanReporter for SilentReporter {}
