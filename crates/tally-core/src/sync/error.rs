use thiserror::Error;

use super::transport::TransportError;

/// Why a sync run was abandoned
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No signed-in user; sync needs a current user")]
    NoCurrentUser,
    #[error("Upload failed: {0}")]
    Upload(#[from] TransportError),
    #[error("Local store error: {0}")]
    Store(#[from] crate::Error),
}

impl SyncError {
    /// Failures that retrying cannot fix
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::NoCurrentUser)
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
