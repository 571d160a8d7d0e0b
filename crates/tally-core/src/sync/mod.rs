//! Change-log synchronization engine.
//!
//! A run uploads one batch of pending change log entries, applies the server's
//! conflict decisions, downloads remote changes since the checkpoint, merges them
//! with last-write-wins and finally advances the checkpoint.

mod clock;
mod conflict;
mod debounce;
mod download;
mod engine;
mod error;
mod http;
mod progress;
mod registry;
mod scheduler;
mod transport;
mod upload;
mod wire;


pub use clock::{Clock, ManualClock, SystemClock};
pub use conflict::{ConflictAction, ConflictResolver};
pub use debounce::Debouncer;
pub use download::{DownloadOutcome, DownloadStage, DownloadSummary};
pub use engine::{SyncEngine, SyncOutcome, SyncReport};
pub use error::{SyncError, SyncResult};
pub use http::HttpSyncTransport;
pub use progress::{group_progress, NoopObserver, ProgressReporter, SyncObserver, SyncPhase};
pub use registry::{ApplyCounts, EntityRegistry};
pub use scheduler::{
    AlwaysOnline, BackoffPolicy, ConnectivityProbe, ExistingWorkPolicy, PeriodicRequest,
    SyncJob, SyncScheduler, MANUAL_SYNC, PERIODIC_SYNC,
};
pub use transport::{SyncTransport, TransportError, TransportResult};
pub use upload::{UploadOutcome, UploadStage, UploadSummary};
pub use wire::{
    ChangeGroup, ChangesResponse, ConflictItem, Resolution, UploadItem, UploadRequest,
    UploadResponse,
};
