//! Download of remote changes since the checkpoint.

use tracing::{info, warn};

use super::error::SyncResult;
use super::progress::{
    group_progress, ProgressReporter, SyncPhase, PROGRESS_APPLIED, PROGRESS_DOWNLOAD_START,
};
use super::registry::{ApplyCounts, EntityRegistry};
use super::transport::SyncTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Applied(DownloadSummary),
    /// The fetch failed; nothing was applied and the window is retried next run
    Unavailable { reason: String },
}

impl DownloadOutcome {
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub groups: usize,
    /// Groups for tables this client does not know
    pub ignored_groups: usize,
    pub rows: ApplyCounts,
}

pub struct DownloadStage<'a, T: SyncTransport> {
    registry: &'a EntityRegistry<'a>,
    transport: &'a T,
}

impl<'a, T: SyncTransport> DownloadStage<'a, T> {
    pub const fn new(registry: &'a EntityRegistry<'a>, transport: &'a T) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Fetch everything newer than `since` and merge it group by group.
    ///
    /// Transport failures are tolerated; store failures are not.
    pub async fn download(
        &self,
        since: i64,
        progress: &ProgressReporter,
    ) -> SyncResult<DownloadOutcome> {
        progress.phase(SyncPhase::Downloading);
        progress.progress(PROGRESS_DOWNLOAD_START);

        let response = match self.transport.fetch_changes(since).await {
            Ok(response) => response,
            Err(error) => {
                warn!(since, %error, "Download failed; remote changes will be fetched next run");
                return Ok(DownloadOutcome::Unavailable {
                    reason: error.to_string(),
                });
            }
        };

        progress.phase(SyncPhase::Applying);
        let total = response.changes.len();
        let mut summary = DownloadSummary {
            groups: total,
            ..DownloadSummary::default()
        };

        for (index, group) in response.changes.iter().enumerate() {
            match self.registry.apply_group(&group.table, &group.rows).await? {
                Some(counts) => summary.rows += counts,
                None => summary.ignored_groups += 1,
            }
            progress.progress(group_progress(index, total));
        }
        progress.progress(PROGRESS_APPLIED);

        info!(
            since,
            groups = summary.groups,
            ignored = summary.ignored_groups,
            inserted = summary.rows.inserted,
            updated = summary.rows.updated,
            discarded = summary.rows.discarded,
            skipped = summary.rows.skipped,
            "Applied remote changes"
        );
        Ok(DownloadOutcome::Applied(summary))
    }
}
