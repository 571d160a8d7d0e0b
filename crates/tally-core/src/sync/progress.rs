//! Run phases and progress reporting.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Where a sync run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    Idle,
    Uploading,
    ConflictHandling,
    Downloading,
    Applying,
    Checkpointing,
    Success,
    Failed,
}

impl SyncPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::ConflictHandling => "conflict_handling",
            Self::Downloading => "downloading",
            Self::Applying => "applying",
            Self::Checkpointing => "checkpointing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side channel for UI consumers. Never influences the run.
pub trait SyncObserver: Send + Sync {
    fn on_progress(&self, _percent: u8) {}

    fn on_phase(&self, _phase: SyncPhase) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

pub const PROGRESS_START: u8 = 0;
pub const PROGRESS_FETCH_PENDING: u8 = 10;
pub const PROGRESS_UPLOADED: u8 = 50;
pub const PROGRESS_DOWNLOAD_START: u8 = 60;
pub const PROGRESS_APPLIED: u8 = 90;
pub const PROGRESS_DONE: u8 = 100;

/// Progress after applying group `index` (zero based) of `total`
#[allow(clippy::cast_possible_truncation)]
pub const fn group_progress(index: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_APPLIED;
    }
    let done = if index + 1 > total { total } else { index + 1 };
    PROGRESS_DOWNLOAD_START + (30 * done / total) as u8
}

/// Forwards progress to an observer, never letting the value go backwards.
pub struct ProgressReporter {
    observer: Arc<dyn SyncObserver>,
    last: AtomicU8,
}

impl ProgressReporter {
    pub fn new(observer: Arc<dyn SyncObserver>) -> Self {
        Self {
            observer,
            last: AtomicU8::new(PROGRESS_START),
        }
    }

    /// Emit the initial 0%
    pub fn start(&self) {
        self.last.store(PROGRESS_START, Ordering::SeqCst);
        self.observer.on_phase(SyncPhase::Idle);
        self.observer.on_progress(PROGRESS_START);
    }

    pub fn progress(&self, percent: u8) {
        let percent = percent.min(PROGRESS_DONE);
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.observer.on_progress(percent);
        }
    }

    pub fn phase(&self, phase: SyncPhase) {
        tracing::debug!(phase = phase.as_str(), "Sync phase");
        self.observer.on_phase(phase);
    }

    pub fn current(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }
}
