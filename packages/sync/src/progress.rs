//! Per-report progress of a sync run.
//!
//! The engine reports each upload as it happens, so a front end can show
//! which report is in flight and how many were rejected. The CLI renders
//! this with `indicatif`; tests and embedders use [`NullProgress`].

use std::sync::Arc;

use clean592_report_models::Report;

use crate::queue::SyncSummary;

/// Result of uploading one pending report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadResult {
    /// The endpoint acknowledged the report.
    Acknowledged,
    /// The upload failed; the report stays pending.
    Failed,
}

/// Receives updates while the pending queue is uploaded.
///
/// Implementations must be `Send + Sync` so they can be shared with
/// background sync tasks.
pub trait SyncProgress: Send + Sync {
    /// A run is starting with `eligible` reports to upload.
    fn started(&self, eligible: u64);

    /// `report` is about to be uploaded.
    fn uploading(&self, report: &Report);

    /// The upload of `report` finished.
    fn uploaded(&self, report: &Report, result: UploadResult);

    /// The run has been committed.
    fn finished(&self, summary: &SyncSummary);
}

/// A [`SyncProgress`] that ignores every update.
pub struct NullProgress;

impl SyncProgress for NullProgress {
    fn started(&self, _eligible: u64) {}
    fn uploading(&self, _report: &Report) {}
    fn uploaded(&self, _report: &Report, _result: UploadResult) {}
    fn finished(&self, _summary: &SyncSummary) {}
}

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn SyncProgress> {
    Arc::new(NullProgress)
}
