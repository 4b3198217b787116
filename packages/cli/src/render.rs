//! Plain-text output for CLI commands.

use clean592_report_models::Report;
use clean592_sync::{QueueSnapshot, SyncSummary};

pub fn print_reports(reports: &[&Report]) {
    if reports.is_empty() {
        println!("No reports.");
        return;
    }

    println!(
        "{:<15} {:<16} {:<16} {:>6}  ADDRESS",
        "ID", "TYPE", "STATUS", "POINTS"
    );
    println!("{}", "-".repeat(80));
    for report in reports {
        println!(
            "{:<15} {:<16} {:<16} {:>6}  {}",
            report.id,
            report.report_type.label(),
            report.status.to_string(),
            report.points_awarded,
            report.address
        );
        if let Some(error) = &report.last_error {
            println!("{:<15} last error (attempt {}): {error}", "", report.retry_count);
        }
    }
}

pub fn print_summary(summary: &SyncSummary) {
    println!("Synced {} report(s).", summary.synced.len());
    for failure in &summary.failed {
        println!("  {failure}");
    }
    if summary.parked > 0 {
        println!(
            "{} report(s) skipped after too many failures (see `reset-retries`).",
            summary.parked
        );
    }
    if summary.interrupted {
        println!("Connectivity dropped; remaining reports stay pending.");
    }
}

pub fn print_profile(snapshot: &QueueSnapshot) {
    println!(
        "Points:   {}\nRank:     #{}",
        snapshot.profile.points, snapshot.profile.rank
    );
}

pub fn print_warning(snapshot: &QueueSnapshot) {
    if let Some(warning) = &snapshot.storage_warning {
        eprintln!("warning: changes not saved yet: {warning}");
    }
}
