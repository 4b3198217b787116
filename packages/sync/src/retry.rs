//! Retry and backoff for report submission.
//!
//! Two layers of retry:
//!
//! 1. **Per sync** ([`submit_with_retry`]): a transient failure is retried
//!    up to [`RetryPolicy::max_attempts`] times with exponential backoff
//!    (`base_delay_ms`, doubled each attempt, capped at `max_delay_ms`).
//!    Rejections are not retried.
//! 2. **Across syncs**: a report that still fails stays pending with its
//!    `retry_count` incremented. Once `retry_count` reaches
//!    [`RetryPolicy::max_report_retries`] the report is parked and skipped
//!    by automatic syncs until its retries are reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clean592_report_models::Report;
use serde::{Deserialize, Serialize};

use crate::client::{SubmissionAck, SubmissionClient, SubmissionError};

/// Retry limits for report submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per report within one sync (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single backoff delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Failed syncs after which a report is parked.
    pub max_report_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            max_report_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Whether `report` has used up its retries across syncs.
    #[must_use]
    pub const fn is_parked(&self, report: &Report) -> bool {
        report.retry_count >= self.max_report_retries
    }
}

/// Submits `report`, retrying transient failures according to `policy`.
///
/// Stops early with [`SubmissionError::Offline`] if `online` is cleared
/// while waiting to retry.
///
/// # Errors
///
/// Returns the last [`SubmissionError`] once attempts are exhausted, the
/// first non-retryable error, or [`SubmissionError::Offline`].
pub async fn submit_with_retry(
    client: &dyn SubmissionClient,
    report: &Report,
    policy: &RetryPolicy,
    online: &AtomicBool,
) -> Result<SubmissionAck, SubmissionError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match client.submit(report).await {
            Ok(ack) => return Ok(ack),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "report {}: {e} (attempt {attempt}/{max_attempts}), retrying in {delay:?}",
                    report.id
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if !online.load(Ordering::SeqCst) {
                    return Err(SubmissionError::Offline);
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
