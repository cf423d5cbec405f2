//! Errors surfaced by the async driver and host tooling.

use folio_core::FolioError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error(transparent)]
    Folio(#[from] FolioError),

    #[error("Connector task is no longer running")]
    Closed,

    #[error("Failed to initialize telemetry: {reason}")]
    Telemetry { reason: String },
}

pub type SyncResult<T> = Result<T, SyncError>;

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for SyncError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::Closed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for SyncError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::Closed
    }
}
