//! Error taxonomy for the sync controller.
//!
//! No error here is fatal to a session: the worst case is a pending save
//! that stays pending until a retry succeeds or the user exports a backup.

use crate::document::DocumentError;
use crate::local::LocalStoreError;
use crate::remote::RemoteError;
use thiserror::Error;

/// Failure while flushing dirty sections to the authoritative backend.
///
/// The dirty set is left intact on every variant, so a later flush retries
/// the same sections.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("Remote write to {path} failed: {source}")]
    RemoteWrite {
        path: String,
        #[source]
        source: RemoteError,
    },

    #[error("Local storage write failed: {0}")]
    LocalQuotaOrAccess(#[from] LocalStoreError),

    #[error("No storage backend available (offline); export the document to keep changes")]
    Offline,
}

impl FlushError {
    /// Short backend label for status displays.
    pub fn backend(&self) -> &'static str {
        match self {
            FlushError::RemoteWrite { .. } => "remote",
            FlushError::LocalQuotaOrAccess(_) => "local",
            FlushError::Offline => "offline",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Import failed: {0}")]
    ImportParse(String),

    #[error("Remote connect error: {0}")]
    RemoteConnect(RemoteError),

    #[error(transparent)]
    Flush(#[from] FlushError),

    #[error("Invalid section {name:?}: {reason}")]
    InvalidSection { name: String, reason: String },

    #[error("Remote health check failed: {0}")]
    HealthCheck(RemoteError),

    #[error("Operation requires remote mode")]
    NotRemote,

    #[error("Controller already initialized")]
    AlreadyInitialized,

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Local storage error: {0}")]
    Local(#[from] LocalStoreError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
