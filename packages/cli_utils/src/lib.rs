#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the clean592 tools.
//!
//! Provides [`IndicatifProgress`], which shows each report as it is
//! uploaded, plus [`init_logger`] which sets up `indicatif-log-bridge` so that
//! `log::info!` and friends are suspended while progress bars redraw.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use clean592_report_models::Report;
use clean592_sync::{SyncProgress, SyncSummary, UploadResult};
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// Sync progress rendered as an `indicatif` bar, one step per report.
pub struct IndicatifProgress {
    bar: ProgressBar,
    bar_style: ProgressStyle,
    rejected: AtomicU64,
}

impl IndicatifProgress {
    /// Adds a sync bar to `multi`. It spins until the engine reports how
    /// many pending reports are eligible.
    #[must_use]
    pub fn sync_bar(multi: &MultiProgress) -> Arc<dyn SyncProgress> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("Checking pending reports");

        let bar_style = ProgressStyle::with_template(
            "  {prefix:.red} {bar:30.green/dim} {pos}/{len} reports  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");

        Arc::new(Self {
            bar,
            bar_style,
            rejected: AtomicU64::new(0),
        })
    }
}

/// Short description of where a report was made.
fn describe(report: &Report) -> String {
    let place = match (&report.location, report.address.trim()) {
        (_, address) if !address.is_empty() => address.to_string(),
        (Some(location), _) => format!("{:.5}, {:.5}", location.lat, location.lng),
        (None, _) => "unknown location".to_string(),
    };
    format!("#{} {} at {place}", report.id, report.report_type.label())
}

impl SyncProgress for IndicatifProgress {
    fn started(&self, eligible: u64) {
        self.bar.set_length(eligible);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
    }

    fn uploading(&self, report: &Report) {
        self.bar.set_message(format!("Uploading {}", describe(report)));
    }

    fn uploaded(&self, _report: &Report, result: UploadResult) {
        if result == UploadResult::Failed {
            let rejected = self.rejected.fetch_add(1, Ordering::SeqCst) + 1;
            self.bar.set_prefix(format!("{rejected} failed"));
        }
        self.bar.inc(1);
    }

    fn finished(&self, summary: &SyncSummary) {
        let msg = if summary.interrupted {
            format!(
                "Offline again after syncing {} report(s)",
                summary.synced.len()
            )
        } else {
            format!(
                "Synced {} report(s), {} failed",
                summary.synced.len(),
                summary.failed.len()
            )
        };
        self.bar.finish_with_message(msg);
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // already set (e.g., in tests)

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use clean592_report_models::{ReportDraft, ReportType};
    use uuid::Uuid;

    use super::*;

    fn report(draft: ReportDraft) -> Report {
        Report::from_draft(draft, 7, Uuid::new_v4(), Utc::now()).unwrap()
    }

    #[test]
    fn describes_report_by_address() {
        let r = report(ReportDraft::new(ReportType::Burning).with_address("  Camp St "));
        assert_eq!(describe(&r), "#7 Burning Report at Camp St");
    }

    #[test]
    fn falls_back_to_coordinates() {
        let r = report(ReportDraft::new(ReportType::Littering).with_location(6.8013, -58.155));
        assert_eq!(describe(&r), "#7 Litter Report at 6.80130, -58.15500");
    }
}
