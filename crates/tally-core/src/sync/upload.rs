//! Upload of one bounded batch of pending changes.

use tracing::{debug, info};

use super::conflict::{ConflictAction, ConflictResolver};
use super::error::SyncResult;
use super::progress::{ProgressReporter, SyncPhase, PROGRESS_FETCH_PENDING};
use super::transport::SyncTransport;
use super::wire::UploadRequest;
use crate::db::ChangeLogStore;

/// Result of a successful upload stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Nothing was pending; no request was sent
    NoOp,
    Uploaded(UploadSummary),
}

impl UploadOutcome {
    pub const fn server_time(&self) -> Option<i64> {
        match self {
            Self::NoOp => None,
            Self::Uploaded(summary) => summary.server_time,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Entries sent in the batch
    pub uploaded: usize,
    /// Entries acknowledged as synced
    pub acknowledged: usize,
    pub conflicts: usize,
    /// Entries re-queued by client-wins conflicts
    pub resynced: usize,
    /// Server clock to persist with the checkpoint
    pub server_time: Option<i64>,
}

pub struct UploadStage<'a, C: ChangeLogStore, T: SyncTransport> {
    change_log: &'a C,
    transport: &'a T,
}

impl<'a, C: ChangeLogStore, T: SyncTransport> UploadStage<'a, C, T> {
    pub const fn new(change_log: &'a C, transport: &'a T) -> Self {
        Self {
            change_log,
            transport,
        }
    }

    /// Send up to `batch_size` pending entries, apply conflicts, acknowledge.
    ///
    /// Any transport failure aborts the stage before anything is acknowledged.
    pub async fn upload(
        &self,
        batch_size: usize,
        progress: &ProgressReporter,
    ) -> SyncResult<UploadOutcome> {
        progress.phase(SyncPhase::Uploading);
        progress.progress(PROGRESS_FETCH_PENDING);

        let changes = self.change_log.get_pending_changes(batch_size).await?;
        if changes.is_empty() {
            debug!("No pending changes to upload");
            return Ok(UploadOutcome::NoOp);
        }

        let request = UploadRequest::from_entries(&changes);
        let response = self.transport.upload(&request).await?;

        let mut resynced = Vec::new();
        if !response.conflicts.is_empty() {
            progress.phase(SyncPhase::ConflictHandling);
            let resolver = ConflictResolver::new(self.change_log);
            for conflict in &response.conflicts {
                if let Some(entry_id) = resolver
                    .resolve(conflict)
                    .await
                    .map(ConflictAction::resynced_entry)?
                {
                    resynced.push(entry_id);
                }
            }
        }

        // Re-queued entries must stay pending through the acknowledgement
        let acknowledged: Vec<i64> = changes
            .iter()
            .map(|entry| entry.id)
            .filter(|id| !resynced.contains(id))
            .collect();
        self.change_log.mark_synced(&acknowledged).await?;

        let summary = UploadSummary {
            uploaded: changes.len(),
            acknowledged: acknowledged.len(),
            conflicts: response.conflicts.len(),
            resynced: resynced.len(),
            server_time: response.server_time,
        };
        info!(
            uploaded = summary.uploaded,
            conflicts = summary.conflicts,
            resynced = summary.resynced,
            "Uploaded pending changes"
        );
        Ok(UploadOutcome::Uploaded(summary))
    }
}
