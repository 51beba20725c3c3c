//! Progress events for UI layers.

use cryptdrop_core::ObjectId;

use crate::state::MigrationSummary;

/// Broadcast capacity. Slow subscribers see `Lagged` and skip ahead.
pub const EVENT_CAPACITY: usize = 64;

/// Something that happened during a migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationEvent {
    Started { total: usize },
    /// Emitted after each batch.
    Progress { current: usize, total: usize },
    ItemFailed { object_id: ObjectId, reason: String },
    Completed(MigrationSummary),
    Cancelled(MigrationSummary),
    /// The run could not proceed at all.
    Failed { reason: String },
}

impl MigrationEvent {
    /// Whether no further events follow for this run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationEvent::Completed(_) | MigrationEvent::Cancelled(_) | MigrationEvent::Failed { .. }
        )
    }
}
