//! Error types for `ticket_ferry`.
//!
//! [`FerryError`] is the crate-wide error. Its variants split into two groups:
//! fatal errors that stop a run (cache build, authentication, source listing,
//! setup failures) and per-ticket errors that the importer turns into a
//! failed [`ImportRecord`](crate::model::ImportRecord).

use crate::api::ApiError;
use crate::model::EntityKind;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FerryError>;

#[derive(Debug, Error)]
pub enum FerryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No .ferry directory found (run `tferry init` first)")]
    NotInitialized,

    /// Reference data could not be pulled from the destination.
    #[error("Failed to build reference cache ({kind}): {source}")]
    CacheBuild {
        kind: EntityKind,
        #[source]
        source: ApiError,
    },

    #[error("Authentication rejected by {system}: {detail}")]
    Auth { system: String, detail: String },

    /// The source ticket listing itself failed.
    #[error("Failed to list source tickets: {0}")]
    Source(#[source] ApiError),

    #[error("Failed to load conversation thread for {ticket}: {source}")]
    Thread {
        ticket: String,
        #[source]
        source: ApiError,
    },

    #[error("Could not resolve {kind} '{key}': {reason}")]
    Resolution {
        kind: EntityKind,
        key: String,
        reason: String,
    },

    #[error("Failed to create {what}: {source}")]
    Creation {
        what: String,
        #[source]
        source: ApiError,
    },

    /// A destination read needed for one ticket failed.
    #[error("Failed to query {what}: {source}")]
    Lookup {
        what: String,
        #[source]
        source: ApiError,
    },
}

impl FerryError {
    /// Fatal errors abort the whole run; everything else is scoped to one ticket.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Resolution { .. }
                | Self::Creation { .. }
                | Self::Lookup { .. }
                | Self::Thread { .. }
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn resolution(kind: EntityKind, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            kind,
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an API failure from a create call, promoting auth failures to fatal.
    pub fn creation(what: impl Into<String>, source: ApiError) -> Self {
        match source {
            ApiError::Unauthorized { system, detail } => Self::Auth { system, detail },
            source => Self::Creation {
                what: what.into(),
                source,
            },
        }
    }

    /// Wrap a per-ticket destination read failure, promoting auth failures to fatal.
    pub fn lookup(what: impl Into<String>, source: ApiError) -> Self {
        match source {
            ApiError::Unauthorized { system, detail } => Self::Auth { system, detail },
            source => Self::Lookup {
                what: what.into(),
                source,
            },
        }
    }

    /// Wrap a thread-loading failure, promoting auth failures to fatal.
    pub fn thread(ticket: impl Into<String>, source: ApiError) -> Self {
        match source {
            ApiError::Unauthorized { system, detail } => Self::Auth { system, detail },
            source => Self::Thread {
                ticket: ticket.into(),
                source,
            },
        }
    }

    /// Wrap a cache-build failure, promoting auth failures to fatal auth errors.
    pub fn cache_build(kind: EntityKind, source: ApiError) -> Self {
        match source {
            ApiError::Unauthorized { system, detail } => Self::Auth { system, detail },
            source => Self::CacheBuild { kind, source },
        }
    }

    /// Wrap a source listing failure.
    pub fn source_listing(source: ApiError) -> Self {
        match source {
            ApiError::Unauthorized { system, detail } => Self::Auth { system, detail },
            source => Self::Source(source),
        }
    }

    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::NotInitialized => 2,
            Self::Auth { .. } => 3,
            Self::CacheBuild { .. } | Self::Source(_) => 4,
            _ => 1,
        }
    }
}
