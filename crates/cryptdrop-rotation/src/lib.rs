//! # cryptdrop Rotation
//!
//! Moves a user's wrapped keys to a new key pair.
//!
//! ## Overview
//!
//! A key-pair change leaves every shared object wrapped for the old public
//! key. [`KeyRotationMigrator`] walks those objects in store-sized batches,
//! re-wraps each entry for the new key and reports progress as a stream of
//! [`MigrationEvent`]s:
//!
//! ```text
//! Idle -> Scanning -> Migrating { current, total } -> Completed | Failed | Cancelled
//! ```
//!
//! Runs are idempotent. There is no account-wide commit point: an
//! interrupted run leaves every object readable with either key, and the
//! next run picks up where the last stopped.

pub mod error;
pub mod events;
pub mod migrator;
pub mod state;

pub use error::{Result, RotationError};
pub use events::MigrationEvent;
pub use migrator::{KeyRotationMigrator, MigrationConfig, RotationKeys};
pub use state::{MigrationFailure, MigrationState, MigrationSummary};
