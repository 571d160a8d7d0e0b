//! Sync run orchestration: upload, download, checkpoint.

use std::future::Future;
use std::sync::Arc;

use libsql::Connection;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::download::{DownloadOutcome, DownloadStage};
use super::error::{SyncError, SyncResult};
use super::progress::{
    NoopObserver, ProgressReporter, SyncObserver, SyncPhase, PROGRESS_DONE, PROGRESS_UPLOADED,
};
use super::registry::EntityRegistry;
use super::scheduler::SyncJob;
use super::transport::SyncTransport;
use super::upload::{UploadOutcome, UploadStage};
use crate::config::SyncSettings;
use crate::db::{LibSqlChangeLogRepository, LibSqlSessionRepository, SessionProvider};
use crate::models::Checkpoint;

/// What a completed run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub user_id: String,
    pub upload: UploadOutcome,
    pub download: DownloadOutcome,
    /// Checkpoint as stored after the run
    pub checkpoint: Checkpoint,
}

impl SyncReport {
    pub const fn uploaded(&self) -> usize {
        match &self.upload {
            UploadOutcome::NoOp => 0,
            UploadOutcome::Uploaded(summary) => summary.uploaded,
        }
    }
}

/// Verdict handed back to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Success(SyncReport),
    /// Transient failure; run again after backoff
    Retry(String),
    /// Retrying will not help
    Fail(String),
}

impl SyncOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Map a failed run onto retry or fail given the attempt budget.
    ///
    /// `attempt` is zero based.
    pub fn from_error(error: &SyncError, attempt: u32, max_attempts: u32) -> Self {
        if error.is_configuration() || attempt.saturating_add(1) >= max_attempts {
            Self::Fail(error.to_string())
        } else {
            Self::Retry(error.to_string())
        }
    }
}

/// Runs one sync pass against the local database and a transport.
pub struct SyncEngine<T> {
    conn: Connection,
    transport: T,
    settings: SyncSettings,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn SyncObserver>,
}

impl<T: SyncTransport> SyncEngine<T> {
    pub fn new(conn: Connection, transport: T, settings: SyncSettings) -> Self {
        Self {
            conn,
            transport,
            settings,
            clock: Arc::new(SystemClock),
            observer: Arc::new(NoopObserver),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Run once and classify the result for the scheduler.
    pub async fn run(&self, attempt: u32) -> SyncOutcome {
        let run_id = Uuid::now_v7();
        let span = info_span!("sync_run", %run_id, attempt);

        async {
            let progress = ProgressReporter::new(Arc::clone(&self.observer));
            match self.execute(&progress).await {
                Ok(report) => {
                    info!(
                        uploaded = report.uploaded(),
                        download_applied = report.download.is_applied(),
                        last_sync_time = report.checkpoint.last_sync_time,
                        "Sync run completed"
                    );
                    SyncOutcome::Success(report)
                }
                Err(sync_error) => {
                    progress.phase(SyncPhase::Failed);
                    let outcome = SyncOutcome::from_error(
                        &sync_error,
                        attempt,
                        self.settings.max_retry_attempts,
                    );
                    match &outcome {
                        SyncOutcome::Retry(_) => {
                            warn!(error = %sync_error, "Sync run failed; will retry");
                        }
                        _ => error!(error = %sync_error, "Sync run failed"),
                    }
                    outcome
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Upload, download and checkpoint without classifying errors.
    pub async fn execute(&self, progress: &ProgressReporter) -> SyncResult<SyncReport> {
        progress.start();

        let session = LibSqlSessionRepository::new(&self.conn);
        let user = session
            .current_user()
            .await?
            .ok_or(SyncError::NoCurrentUser)?;

        let change_log = LibSqlChangeLogRepository::new(&self.conn);
        let upload = UploadStage::new(&change_log, &self.transport)
            .upload(self.settings.batch_size, progress)
            .await?;
        progress.progress(PROGRESS_UPLOADED);

        let since = session.last_sync_time().await?;
        let registry = EntityRegistry::new(&self.conn);
        let download = DownloadStage::new(&registry, &self.transport)
            .download(since, progress)
            .await?;

        progress.phase(SyncPhase::Checkpointing);
        let mut checkpoint = session.checkpoint().await?;
        if download.is_applied() {
            let now = self.clock.now_millis();
            session.update_last_sync_time(now).await?;
            checkpoint.last_sync_time = now;
        }
        if let Some(server_time) = upload.server_time() {
            session.update_server_time(server_time).await?;
            checkpoint.server_time = Some(server_time);
        }
        progress.progress(PROGRESS_DONE);
        progress.phase(SyncPhase::Success);

        Ok(SyncReport {
            user_id: user.id,
            upload,
            download,
            checkpoint,
        })
    }
}

impl<T: SyncTransport + 'static> SyncJob for SyncEngine<T> {
    fn run_job(&self, attempt: u32) -> impl Future<Output = SyncOutcome> + Send {
        self.run(attempt)
    }
}
