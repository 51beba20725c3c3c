//! Error types for key rotation.

use thiserror::Error;

use crate::state::MigrationSummary;

/// Errors that can occur during a rotation run.
#[derive(Debug, Error)]
pub enum RotationError {
    /// Some objects could not be migrated. The rest were.
    #[error("{} of {} objects failed to migrate", .0.failures.len(), .0.total)]
    MigrationPartialFailure(MigrationSummary),

    /// The run was cancelled between batches.
    #[error("migration cancelled after {} of {} objects", .0.processed(), .0.total)]
    Cancelled(MigrationSummary),

    /// Another run is in progress on this migrator.
    #[error("migration already running")]
    AlreadyRunning,

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] cryptdrop_store::StoreError),

    /// Envelope operation failed.
    #[error("envelope error: {0}")]
    Envelope(#[from] cryptdrop_envelope::EnvelopeError),
}

impl RotationError {
    /// The summary carried by partial-failure and cancel outcomes.
    pub fn summary(&self) -> Option<&MigrationSummary> {
        match self {
            RotationError::MigrationPartialFailure(s) | RotationError::Cancelled(s) => Some(s),
            _ => None,
        }
    }
}

/// Result type for rotation operations.
pub type Result<T> = std::result::Result<T, RotationError>;
