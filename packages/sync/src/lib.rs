#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Offline report queue and sync engine.
//!
//! [`ReportQueue`] owns the two report collections:
//!
//! * the **pending queue**, reports created while offline, in submission
//!   order
//! * the **history**, reports acknowledged by the submission endpoint,
//!   most recent first
//!
//! Every report lives in exactly one of them. When connectivity returns,
//! [`ReportQueue::on_connectivity_restored`] uploads the pending queue
//! through a [`SubmissionClient`] and moves acknowledged reports into the
//! history as a single state transition. Both collections are persisted
//! through a [`clean592_storage::ReportStore`].

pub mod client;
pub mod config;
pub mod progress;
pub mod queue;
pub mod retry;

use clean592_report_models::{ReportStatus, ValidationError};
use clean592_storage::StorageError;

pub use client::{SimulatedClient, SubmissionAck, SubmissionClient, SubmissionError};
pub use config::{ConfigError, EngineConfig, load_config};
pub use progress::{NullProgress, SyncProgress, UploadResult, null_progress};
pub use queue::{QueueSnapshot, ReportQueue, SyncOutcome, SyncSummary};
pub use retry::RetryPolicy;

/// Errors returned by [`ReportQueue`] operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The draft is incomplete; nothing was queued.
    #[error("Invalid report: {0}")]
    Validation(#[from] ValidationError),

    /// Durable storage could not be read.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// No report with this id exists in either collection.
    #[error("Report {id} not found")]
    ReportNotFound {
        /// Requested report id.
        id: i64,
    },

    /// The report is still pending and cannot be updated yet.
    #[error("Report {id} has not been synced yet")]
    NotInHistory {
        /// Requested report id.
        id: i64,
    },

    /// The report has already been synced.
    #[error("Report {id} is not pending")]
    NotPending {
        /// Requested report id.
        id: i64,
    },

    /// Status would move backwards or stay the same.
    #[error("Report {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Requested report id.
        id: i64,
        /// Current status.
        from: ReportStatus,
        /// Requested status.
        to: ReportStatus,
    },
}

/// A report that could not be uploaded during a sync.
///
/// The report stays pending; the failure never aborts the rest of the
/// batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The submission endpoint failed or refused the report.
    #[error("Report {report_id} failed to sync: {source}")]
    Submission {
        /// Id of the report that stayed pending.
        report_id: i64,
        /// Final submission error.
        source: SubmissionError,
    },
}

impl SyncError {
    /// Id of the report that stayed pending.
    #[must_use]
    pub const fn report_id(&self) -> i64 {
        match self {
            Self::Submission { report_id, .. } => *report_id,
        }
    }
}
