use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tally_core::config::SyncSettings;
use tally_core::db::{
    ChangeLogStore, Database, LibSqlChangeLogRepository, LibSqlSessionRepository, SessionProvider,
};
use tally_core::sync::{
    DownloadOutcome, ExistingWorkPolicy, HttpSyncTransport, PeriodicRequest, SyncEngine,
    SyncObserver, SyncOutcome, SyncPhase, SyncReport, SyncScheduler, UploadOutcome,
    PERIODIC_SYNC,
};
use tally_core::util::normalize_text_option;
use tally_core::SyncState;

use crate::cli::SyncCommands;
use crate::commands::common::{format_timestamp, open_database, print_json, ProfileSettings};
use crate::error::CliError;

pub async fn run_sync(
    command: SyncCommands,
    profile: ProfileSettings,
    db_path: &Path,
) -> Result<(), CliError> {
    match command {
        SyncCommands::Run { batch_size } => {
            let mut settings = profile.settings;
            if let Some(batch_size) = batch_size {
                settings.batch_size = batch_size;
            }
            let report = run_sync_once(settings, db_path).await?;
            for line in format_report_lines(&report) {
                println!("{line}");
            }
            Ok(())
        }
        SyncCommands::Watch => run_sync_watch(profile.settings, db_path).await,
        SyncCommands::Status { json } => run_sync_status(json, db_path).await,
    }
}

/// Logs phase changes of a CLI-driven run
struct LogObserver;

impl SyncObserver for LogObserver {
    fn on_progress(&self, percent: u8) {
        tracing::debug!(percent, "Sync progress");
    }

    fn on_phase(&self, phase: SyncPhase) {
        tracing::debug!(phase = %phase, "Sync phase");
    }
}

fn build_engine(
    settings: SyncSettings,
    db: &Database,
) -> Result<SyncEngine<HttpSyncTransport>, CliError> {
    settings.validate().map_err(CliError::Config)?;
    if settings.api_base_url().is_none() {
        return Err(CliError::SyncNotConfigured);
    }

    let token = normalize_text_option(std::env::var("TALLY_API_TOKEN").ok());
    let transport = HttpSyncTransport::from_settings(&settings, token)?;
    Ok(SyncEngine::new(db.connection().clone(), transport, settings)
        .with_observer(Arc::new(LogObserver)))
}

pub async fn run_sync_once(settings: SyncSettings, db_path: &Path) -> Result<SyncReport, CliError> {
    let db = open_database(db_path).await?;
    let engine = build_engine(settings, &db)?;

    match engine.run(0).await {
        SyncOutcome::Success(report) => Ok(report),
        SyncOutcome::Retry(reason) => Err(CliError::SyncRetry(reason)),
        SyncOutcome::Fail(reason) => Err(CliError::SyncFailed(reason)),
    }
}

async fn run_sync_watch(settings: SyncSettings, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let request = PeriodicRequest::from_settings(&settings);
    let scheduler_settings = settings.clone();
    let engine = Arc::new(build_engine(settings, &db)?);

    let scheduler = SyncScheduler::new(engine, &scheduler_settings);
    let mut status = scheduler.status();
    scheduler.enqueue_unique_periodic(PERIODIC_SYNC, ExistingWorkPolicy::Keep, request);
    println!(
        "Syncing every {}s; press Ctrl-C to stop",
        request.interval.as_secs()
    );

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *status.borrow_and_update();
                print_state(state);
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping sync");
                break;
            }
        }
    }

    scheduler.shutdown();
    Ok(())
}

fn print_state(state: SyncState) {
    match state {
        SyncState::Syncing => println!("Syncing..."),
        SyncState::Success => println!("Sync completed"),
        SyncState::Error => println!("Sync failed; see logs"),
        SyncState::Idle => {}
    }
}

#[derive(Debug, Serialize)]
pub struct SyncStatusView {
    pub user_id: Option<String>,
    pub last_sync_time: i64,
    pub last_sync_time_iso: String,
    pub server_time: Option<i64>,
    pub pending_changes: u64,
}

pub async fn sync_status(db_path: &Path) -> Result<SyncStatusView, CliError> {
    let db = open_database(db_path).await?;
    let session = LibSqlSessionRepository::new(db.connection());
    let user = session.current_user().await?;
    let checkpoint = session.checkpoint().await?;
    let pending_changes = LibSqlChangeLogRepository::new(db.connection())
        .pending_count()
        .await?;

    Ok(SyncStatusView {
        user_id: user.map(|user| user.id),
        last_sync_time: checkpoint.last_sync_time,
        last_sync_time_iso: format_timestamp(checkpoint.last_sync_time),
        server_time: checkpoint.server_time,
        pending_changes,
    })
}

async fn run_sync_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let view = sync_status(db_path).await?;
    if as_json {
        return print_json(&view);
    }

    println!(
        "User:            {}",
        view.user_id.as_deref().unwrap_or("(not signed in)")
    );
    println!("Last sync:       {}", view.last_sync_time_iso);
    println!(
        "Server time:     {}",
        view.server_time.map_or_else(|| "unknown".to_string(), format_timestamp)
    );
    println!("Pending changes: {}", view.pending_changes);
    Ok(())
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!("Sync completed for {}", report.user_id)];

    match &report.upload {
        UploadOutcome::NoOp => lines.push("Upload: nothing pending".to_string()),
        UploadOutcome::Uploaded(summary) => lines.push(format!(
            "Upload: {} sent, {} conflicts, {} re-queued",
            summary.uploaded, summary.conflicts, summary.resynced
        )),
    }

    match &report.download {
        DownloadOutcome::Applied(summary) => lines.push(format!(
            "Download: {} groups ({} ignored), {} inserted, {} updated, {} unchanged, {} skipped",
            summary.groups,
            summary.ignored_groups,
            summary.rows.inserted,
            summary.rows.updated,
            summary.rows.discarded,
            summary.rows.skipped
        )),
        DownloadOutcome::Unavailable { reason } => {
            lines.push(format!("Download: unavailable ({reason}); will retry next run"));
        }
    }

    lines.push(format!(
        "Checkpoint: {}",
        format_timestamp(report.checkpoint.last_sync_time)
    ));
    lines
}
