#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for submitting and syncing clean592 reports.
//!
//! Reports are kept in a file-backed store (`--data-dir`, `$CLEAN592_DATA_DIR`
//! or `./data`) and uploaded through the simulated submission endpoint.
//! Uses `indicatif-log-bridge` (via [`clean592_cli_utils::init_logger`]) so
//! that log lines and the sync progress bar never fight for the terminal.

mod render;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use clean592_cli_utils::{IndicatifProgress, MultiProgress};
use clean592_report_models::{ReportDraft, ReportFilter, ReportStatus, ReportType};
use clean592_storage::FileStore;
use clean592_storage::paths::default_data_dir;
use clean592_sync::{EngineConfig, ReportQueue, SimulatedClient, SyncOutcome, load_config};

#[derive(Parser)]
#[command(name = "clean592", about = "Report illegal dumping and littering")]
struct Cli {
    /// Directory holding the report store
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Engine config TOML overriding the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new report
    Submit {
        /// Violation type (`vehicle_dumping`, `littering`, `burning`, `other`)
        #[arg(long = "type")]
        report_type: ReportType,
        /// Display address of the violation
        #[arg(long, default_value = "")]
        address: String,
        /// Latitude of the violation
        #[arg(long, requires = "lng", allow_negative_numbers = true)]
        lat: Option<f64>,
        /// Longitude of the violation
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lng: Option<f64>,
        /// What happened
        #[arg(long, default_value = "")]
        description: String,
        /// License plate of the offending vehicle
        #[arg(long)]
        plate: Option<String>,
        /// Submit without attaching your identity
        #[arg(long)]
        anonymous: bool,
        /// Queue the report as if the device had no connectivity
        #[arg(long)]
        offline: bool,
    },
    /// Upload every pending report
    Sync,
    /// Show queue sizes and profile
    Status,
    /// List pending reports and history
    History {
        /// Only reports of this type
        #[arg(long = "type")]
        report_type: Option<ReportType>,
        /// Only reports in this status (e.g., "received", "action_taken")
        #[arg(long)]
        status: Option<ReportStatus>,
    },
    /// Show points and rank
    Profile,
    /// Record a moderation status update for a synced report
    UpdateStatus {
        /// Report id
        id: i64,
        /// New status (`investigation` or `action_taken`)
        status: ReportStatus,
    },
    /// Make a parked pending report eligible for sync again
    ResetRetries {
        /// Report id
        id: i64,
    },
}

async fn open_queue(
    cli_data_dir: Option<PathBuf>,
    config: EngineConfig,
    online: bool,
    multi: Option<&MultiProgress>,
) -> Result<ReportQueue, Box<dyn std::error::Error>> {
    let data_dir = cli_data_dir
        .or_else(|| config.data_dir.clone())
        .unwrap_or_else(default_data_dir);
    log::debug!("Using data directory {}", data_dir.display());

    let store = Arc::new(FileStore::new(data_dir));
    let client = Arc::new(SimulatedClient::new(config.simulated_delay()));
    let queue = ReportQueue::open(store, client, config, online).await?;

    Ok(match multi {
        Some(multi) => queue.with_progress(IndicatifProgress::sync_bar(multi)),
        None => queue,
    })
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = clean592_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Submit {
            report_type,
            address,
            lat,
            lng,
            description,
            plate,
            anonymous,
            offline,
        } => {
            let queue = open_queue(cli.data_dir, config, !offline, None).await?;

            let mut draft = ReportDraft::new(report_type)
                .with_address(address)
                .with_description(description);
            if let (Some(lat), Some(lng)) = (lat, lng) {
                draft = draft.with_location(lat, lng);
            }
            if let Some(plate) = plate {
                draft = draft.with_license_plate(plate);
            }
            draft.anonymous = anonymous;

            let report = queue.submit(draft).await?;
            println!(
                "Report {} submitted: {} ({} points)",
                report.id, report.status, report.points_awarded
            );
            render::print_warning(&queue.snapshot().await);
        }
        Commands::Sync => {
            let queue = open_queue(cli.data_dir, config, false, Some(&multi)).await?;

            match queue.on_connectivity_restored().await {
                SyncOutcome::NothingToSync => println!("Nothing to sync."),
                SyncOutcome::AlreadySyncing => println!("A sync is already running."),
                SyncOutcome::Completed(summary) => render::print_summary(&summary),
            }
            let snapshot = queue.snapshot().await;
            render::print_profile(&snapshot);
            render::print_warning(&snapshot);
        }
        Commands::Status => {
            let queue = open_queue(cli.data_dir, config, false, None).await?;
            let snapshot = queue.snapshot().await;

            println!("Pending:  {}", snapshot.pending.len());
            println!("History:  {}", snapshot.history.len());
            render::print_profile(&snapshot);
            render::print_warning(&snapshot);
        }
        Commands::History {
            report_type,
            status,
        } => {
            let queue = open_queue(cli.data_dir, config, false, None).await?;
            let snapshot = queue.snapshot().await;
            let filter = ReportFilter {
                report_type,
                status,
            };

            render::print_reports(&snapshot.filtered(&filter));
        }
        Commands::Profile => {
            let queue = open_queue(cli.data_dir, config, false, None).await?;
            queue.recompute_profile().await;
            render::print_profile(&queue.snapshot().await);
        }
        Commands::UpdateStatus { id, status } => {
            let queue = open_queue(cli.data_dir, config, false, None).await?;
            let report = queue.update_status(id, status).await?;

            println!(
                "Report {} is now {} ({} points)",
                report.id, report.status, report.points_awarded
            );
            render::print_profile(&queue.snapshot().await);
        }
        Commands::ResetRetries { id } => {
            let queue = open_queue(cli.data_dir, config, false, None).await?;
            let report = queue.reset_retries(id).await?;

            println!("Report {} will be retried on the next sync", report.id);
        }
    }

    Ok(())
}
