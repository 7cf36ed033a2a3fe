//! Core data types for `ticket_ferry`.
//!
//! - [`SourceTicket`] / [`ConversationEntry`] - read-only view of a source ticket
//! - [`NewTicket`] / [`NewComment`] - destination-side create payloads
//! - [`ReferenceEntity`] - destination lookup data (people, statuses, types)
//! - [`ImportRecord`] - outcome of importing one source ticket

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of destination-side reference entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Technician,
    Customer,
    Contact,
    Status,
    IssueType,
}

impl EntityKind {
    pub const ALL: [Self; 5] = [
        Self::Technician,
        Self::Customer,
        Self::Contact,
        Self::Status,
        Self::IssueType,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Technician => "technician",
            Self::Customer => "customer",
            Self::Contact => "contact",
            Self::Status => "status",
            Self::IssueType => "issue-type",
        }
    }

    /// People can be created on the destination; statuses and types cannot.
    #[must_use]
    pub const fn is_person(self) -> bool {
        matches!(self, Self::Technician | Self::Customer | Self::Contact)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "technician" | "tech" => Ok(Self::Technician),
            "customer" | "client" => Ok(Self::Customer),
            "contact" => Ok(Self::Contact),
            "status" => Ok(Self::Status),
            "issue-type" | "issue_type" | "type" => Ok(Self::IssueType),
            other => Err(format!("Unknown entity kind: {other}")),
        }
    }
}

/// A destination-side entity as listed (or created) through the destination API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntity {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl ReferenceEntity {
    #[must_use]
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
        }
    }
}

/// Fields for creating a missing person entity on the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewEntity {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Owning customer for contacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

/// A person referenced by a source ticket (technician, contact).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePerson {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl SourcePerson {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
        }
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty() && self.email.as_deref().is_none_or(|e| e.trim().is_empty())
    }
}

/// Visibility of a conversation entry on the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Kind of a raw source conversation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Initial problem statement; becomes the ticket body.
    Description,
    TechReply,
    CustomerReply,
    Note,
    Other(String),
}

impl EntryKind {
    /// Map the source platform's conversation type tag.
    #[must_use]
    pub fn from_source_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "DESCRIPTION" => Self::Description,
            "TECH_REPLY" => Self::TechReply,
            "REQ_REPLY" | "REQUESTER_REPLY" | "CUSTOMER_REPLY" => Self::CustomerReply,
            "NOTE" => Self::Note,
            _ => Self::Other(tag.to_string()),
        }
    }

    /// Human label used as the destination comment subject.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Description => "Description",
            Self::TechReply => "Tech Reply",
            Self::CustomerReply => "Customer Reply",
            Self::Note => "Note",
            Self::Other(tag) => tag,
        }
    }
}

/// One note or reply within a source ticket's thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub kind: EntryKind,
    pub author: SourcePerson,
    pub created_at: DateTime<Utc>,
    pub body: String,
    pub visibility: Visibility,
    /// Direct recipients (the source's "to" list), used for contact attribution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<SourcePerson>,
}

/// Ticket header as listed by the source, before its thread is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTicketHeader {
    /// Internal source id, used for API calls.
    pub ticket_id: String,
    /// Human-visible ticket number; the dedup key.
    pub display_id: String,
    pub subject: String,
    pub customer: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub issue_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A fully assembled source ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTicket {
    pub ticket_id: String,
    pub display_id: String,
    pub subject: String,
    pub description: Option<String>,
    pub customer: String,
    pub contact: Option<SourcePerson>,
    pub technician: Option<SourcePerson>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub issue_type: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Chronological, description excluded.
    pub conversation: Vec<ConversationEntry>,
}

/// Destination ticket create payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTicket {
    pub customer_id: String,
    pub contact_id: Option<String>,
    pub technician_id: Option<String>,
    pub subject: String,
    pub body: String,
    pub status: Option<String>,
    pub issue_type: Option<String>,
    pub priority: Option<String>,
    /// RFC 3339 timestamp in the destination's UTC offset.
    pub created_at: String,
}

/// Destination comment create payload. Imported comments are always hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewComment {
    pub subject: String,
    pub body: String,
    pub author: String,
    pub hidden: bool,
    pub do_not_email: bool,
}

/// Destination ticket as returned by the create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedTicket {
    pub id: String,
    #[serde(default)]
    pub number: Option<String>,
}

/// Minimal destination ticket view used for subject scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSummary {
    pub id: String,
    pub subject: String,
}

/// Outcome of importing one source ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportOutcome {
    Created,
    SkippedDuplicate,
    SkippedCutoff,
    Failed,
}

impl ImportOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::SkippedDuplicate => "skipped-duplicate",
            Self::SkippedCutoff => "skipped-cutoff",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-ticket import log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub source_id: String,
    pub outcome: ImportOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
    #[serde(default)]
    pub comments_created: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportRecord {
    #[must_use]
    pub fn created(source_id: &str, destination_id: &str, comments_created: usize) -> Self {
        Self {
            source_id: source_id.to_string(),
            outcome: ImportOutcome::Created,
            destination_id: Some(destination_id.to_string()),
            comments_created,
            error: None,
        }
    }

    #[must_use]
    pub fn skipped_duplicate(source_id: &str, existing_id: Option<&str>) -> Self {
        Self {
            source_id: source_id.to_string(),
            outcome: ImportOutcome::SkippedDuplicate,
            destination_id: existing_id.map(str::to_string),
            comments_created: 0,
            error: None,
        }
    }

    #[must_use]
    pub fn skipped_cutoff(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            outcome: ImportOutcome::SkippedCutoff,
            destination_id: None,
            comments_created: 0,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(
        source_id: &str,
        destination_id: Option<&str>,
        comments_created: usize,
        error: &str,
    ) -> Self {
        Self {
            source_id: source_id.to_string(),
            outcome: ImportOutcome::Failed,
            destination_id: destination_id.map(str::to_string),
            comments_created,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn entry_kind_maps_source_tags() {
        assert_eq!(EntryKind::from_source_tag("TECH_REPLY"), EntryKind::TechReply);
        assert_eq!(EntryKind::from_source_tag("description"), EntryKind::Description);
        assert_eq!(
            EntryKind::from_source_tag("FORWARD"),
            EntryKind::Other("FORWARD".to_string())
        );
    }

    #[test]
    fn outcome_serializes_kebab_case() {
        let record = ImportRecord::skipped_duplicate("1042", Some("77"));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"skipped-duplicate\""));
        assert!(json.contains("\"77\""));
        assert!(!json.contains("error"));
    }

    #[test]
    fn blank_person_detection() {
        assert!(SourcePerson::default().is_blank());
        assert!(!SourcePerson::named("Ann").is_blank());
    }
}
