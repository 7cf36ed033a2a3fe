//! `ticket_ferry` - helpdesk ticket migration engine
//!
//! This crate provides the core functionality for the `tferry` CLI tool,
//! which copies tickets and their conversation threads from SuperOps into
//! Syncro, and can be re-run without creating duplicates.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`cli`] - Command-line interface using clap
//! - [`api`] - Source/destination API traits and HTTP clients
//! - [`cache`] - Reference snapshot of destination lookup data
//! - [`resolve`] - Identity resolution against the snapshot
//! - [`dedup`] - Duplicate detection (cross-reference store + subject marker)
//! - [`import`] - Per-ticket import and thread assembly
//! - [`run`] - Run driver and per-run import log
//! - [`model`] - Data types (tickets, conversation entries, import records)
//! - [`storage`] - `SQLite` cross-reference store
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling
//! - [`util`] - Utility functions (HTML, time, keys)

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod import;
pub mod logging;
pub mod model;
pub mod resolve;
pub mod run;
pub mod storage;
pub mod util;

pub use error::{FerryError, Result};
