//! `SQLite` storage layer for `ticket_ferry`.
//!
//! Holds the cross-reference store that maps each imported source ticket to
//! its destination ticket, so repeated runs can skip work without scanning
//! destination subjects.
//!
//! # Submodules
//!
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main `SQLite` storage implementation

pub mod schema;
pub mod sqlite;

pub use sqlite::{Link, LinkState, SqliteStorage};

/// Metadata key for the timestamp of the last completed run.
pub const METADATA_LAST_RUN_AT: &str = "last_run_at";
