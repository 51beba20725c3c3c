//! Migration state and run summaries.

use serde::{Deserialize, Serialize};

use cryptdrop_core::ObjectId;

use crate::error::{Result, RotationError};

/// One object that could not be migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationFailure {
    pub object_id: ObjectId,
    pub reason: String,
}

/// Result of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    /// Objects shared with the user when the run started.
    pub total: usize,
    /// Objects re-wrapped by this run.
    pub migrated: usize,
    /// Objects the new key already opened.
    pub already_migrated: usize,
    pub failures: Vec<MigrationFailure>,
}

impl MigrationSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Objects handled so far, successfully or not.
    pub fn processed(&self) -> usize {
        self.migrated + self.already_migrated + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn fail(&mut self, object_id: ObjectId, reason: impl Into<String>) -> MigrationFailure {
        let failure = MigrationFailure {
            object_id,
            reason: reason.into(),
        };
        self.failures.push(failure.clone());
        failure
    }

    /// `MigrationPartialFailure` if any object failed.
    pub fn into_result(self) -> Result<Self> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(RotationError::MigrationPartialFailure(self))
        }
    }
}

/// Observable state of a migrator.
///
/// `Idle -> Scanning -> Migrating { current, total } -> Completed | Failed | Cancelled`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MigrationState {
    #[default]
    Idle,
    Scanning,
    Migrating {
        current: usize,
        total: usize,
    },
    Completed(MigrationSummary),
    Failed(String),
    Cancelled(MigrationSummary),
}

impl MigrationState {
    pub fn is_running(&self) -> bool {
        matches!(self, MigrationState::Scanning | MigrationState::Migrating { .. })
    }
}
