//! Submission endpoint abstraction.
//!
//! The engine hands each report to a [`SubmissionClient`] and waits for a
//! [`SubmissionAck`]. Clients must be idempotent on
//! [`Report::correlation_id`]: submitting the same report twice (for
//! example after a retry whose first response was lost) must not create a
//! second record and must return the same acknowledgment.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use clean592_report_models::{Report, ReportStatus};
use uuid::Uuid;

/// Acknowledgment returned by the submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionAck {
    /// Id assigned to the report by the endpoint.
    pub server_id: String,
    /// Status the endpoint recorded for the report.
    pub status: ReportStatus,
}

/// Errors from a single submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    /// Temporary failure (timeout, connection reset, server error).
    #[error("transient submission failure: {message}")]
    Transient {
        /// Description of what went wrong.
        message: String,
    },

    /// The endpoint refused the report. Retrying within the same sync will
    /// not help.
    #[error("submission rejected: {message}")]
    Rejected {
        /// Reason given by the endpoint.
        message: String,
    },

    /// Connectivity was lost before the attempt could be made.
    #[error("device is offline")]
    Offline,
}

impl SubmissionError {
    /// Whether another attempt in the same sync may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Sends reports to the submission endpoint.
#[async_trait]
pub trait SubmissionClient: Send + Sync {
    /// Submits one report.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError`] if the endpoint could not be reached or
    /// refused the report.
    async fn submit(&self, report: &Report) -> Result<SubmissionAck, SubmissionError>;
}

/// A stand-in endpoint that acknowledges every report after a fixed delay.
///
/// Acknowledgments are remembered per correlation id, so resubmitting a
/// report returns the original server id.
#[derive(Debug)]
pub struct SimulatedClient {
    delay: Duration,
    next_server_id: AtomicU64,
    acks: Mutex<BTreeMap<Uuid, SubmissionAck>>,
}

impl SimulatedClient {
    /// Creates a client that waits `delay` before each acknowledgment.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_server_id: AtomicU64::new(1),
            acks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of distinct reports acknowledged so far.
    #[must_use]
    pub fn acknowledged(&self) -> usize {
        self.acks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl SubmissionClient for SimulatedClient {
    async fn submit(&self, report: &Report) -> Result<SubmissionAck, SubmissionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut acks = self.acks.lock().unwrap_or_else(PoisonError::into_inner);
        let ack = acks
            .entry(report.correlation_id)
            .or_insert_with(|| SubmissionAck {
                server_id: format!(
                    "srv-{}",
                    self.next_server_id.fetch_add(1, Ordering::SeqCst)
                ),
                status: ReportStatus::Received,
            })
            .clone();
        drop(acks);

        log::debug!("simulated endpoint acknowledged report {} as {}", report.id, ack.server_id);
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use clean592_report_models::{ReportDraft, ReportType};

    use super::*;

    fn report() -> Report {
        Report::from_draft(
            ReportDraft::new(ReportType::VehicleDumping).with_address("Sheriff St"),
            1,
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn acknowledges_as_received() {
        let client = SimulatedClient::new(Duration::ZERO);
        let ack = client.submit(&report()).await.unwrap();
        assert_eq!(ack.status, ReportStatus::Received);
        assert_eq!(ack.server_id, "srv-1");
    }

    #[tokio::test]
    async fn resubmission_is_idempotent() {
        let client = SimulatedClient::new(Duration::ZERO);
        let r = report();

        let first = client.submit(&r).await.unwrap();
        let second = client.submit(&r).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.acknowledged(), 1);
        assert_eq!(client.submit(&report()).await.unwrap().server_id, "srv-2");
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        let transient = SubmissionError::Transient {
            message: "timeout".to_string(),
        };
        let rejected = SubmissionError::Rejected {
            message: "spam".to_string(),
        };

        assert!(transient.is_retryable());
        assert!(!rejected.is_retryable());
        assert!(!SubmissionError::Offline.is_retryable());
    }
}
