//! Source and destination API seams.
//!
//! The import engine only talks to the two platforms through [`SourceApi`] and
//! [`DestinationApi`]. Production implementations live in [`superops`] and
//! [`syncro`]; both share the blocking [`http::HttpClient`] for timeouts,
//! throttling and retries.

pub mod http;
pub mod superops;
pub mod syncro;

pub use http::{HttpClient, HttpSettings};
pub use superops::SuperOpsClient;
pub use syncro::SyncroClient;

use crate::model::{
    ConversationEntry, CreatedTicket, EntityKind, NewComment, NewEntity, NewTicket,
    ReferenceEntity, SourceTicketHeader, TicketSummary,
};
use thiserror::Error;

/// Result alias for API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Failure of a single remote call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{system} rejected credentials: {detail}")]
    Unauthorized { system: String, detail: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),
}

impl ApiError {
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Read side of the source helpdesk.
pub trait SourceApi {
    /// List ticket headers in the order the source returns them.
    ///
    /// # Errors
    ///
    /// Returns an error if any listing request fails.
    fn list_tickets(&self) -> ApiResult<Vec<SourceTicketHeader>>;

    /// List every conversation entry and note of one ticket, unsorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be fetched.
    fn list_conversations(&self, ticket_id: &str) -> ApiResult<Vec<ConversationEntry>>;
}

/// Read/write side of the destination helpdesk.
pub trait DestinationApi {
    /// List every entity of one reference kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn list_reference_entities(&self, kind: EntityKind) -> ApiResult<Vec<ReferenceEntity>>;

    /// List id and subject of every destination ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn list_ticket_subjects(&self) -> ApiResult<Vec<TicketSummary>>;

    /// Create a ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination rejects the ticket.
    fn create_ticket(&self, ticket: &NewTicket) -> ApiResult<CreatedTicket>;

    /// Add a comment to an existing ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination rejects the comment.
    fn create_comment(&self, ticket_id: &str, comment: &NewComment) -> ApiResult<()>;

    /// Create a missing person entity.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails or the kind cannot be created remotely.
    fn create_entity(&self, kind: EntityKind, fields: &NewEntity) -> ApiResult<ReferenceEntity>;
}
