//! Duplicate detection for source tickets.
//!
//! A source ticket counts as imported when:
//! 1. The cross-reference store has a link for its display id
//! 2. A destination subject carries its marker token (`[SRC#1042]`)
//! 3. (opt-in) A destination subject ends with ` <display id>`, the format
//!    used by earlier one-off migrations
//!
//! Destination subjects are listed at most once per run and indexed by the
//! display id extracted from their marker.

use crate::api::DestinationApi;
use crate::error::{FerryError, Result};
use crate::model::TicketSummary;
use crate::storage::{Link, LinkState, SqliteStorage};
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info};

/// Default marker prefix.
pub const DEFAULT_MARKER_PREFIX: &str = "SRC";

/// Embeds and extracts the source display id in destination subjects.
#[derive(Debug, Clone)]
pub struct SubjectMarker {
    prefix: String,
    pattern: Regex,
}

impl SubjectMarker {
    /// Create a marker with the given prefix (`SRC` gives `[SRC#<id>]`).
    ///
    /// # Errors
    ///
    /// Returns a config error if the prefix is empty or contains characters
    /// other than ASCII letters, digits, `-` and `_`.
    pub fn new(prefix: &str) -> Result<Self> {
        let prefix = prefix.trim();
        if prefix.is_empty()
            || !prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(FerryError::config(format!(
                "Invalid marker prefix '{prefix}': use letters, digits, '-' or '_'"
            )));
        }

        let pattern = Regex::new(&format!(r"\[{}#([^\[\]\s]+)\]", regex::escape(prefix)))
            .map_err(|e| FerryError::config(format!("Invalid marker prefix '{prefix}': {e}")))?;

        Ok(Self {
            prefix: prefix.to_string(),
            pattern,
        })
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The bare token for a display id.
    #[must_use]
    pub fn token(&self, display_id: &str) -> String {
        format!("[{}#{}]", self.prefix, display_id.trim())
    }

    /// Append the token to a subject. Subjects already carrying it are kept as is.
    #[must_use]
    pub fn embed(&self, subject: &str, display_id: &str) -> String {
        let subject = subject.trim();
        if self.extract(subject) == Some(display_id.trim()) {
            return subject.to_string();
        }
        let token = self.token(display_id);
        if subject.is_empty() {
            token
        } else {
            format!("{subject} {token}")
        }
    }

    /// Display id from the last marker token in a subject.
    #[must_use]
    pub fn extract<'s>(&self, subject: &'s str) -> Option<&'s str> {
        self.pattern
            .captures_iter(subject)
            .last()
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// How an existing destination ticket was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Cross-reference store link.
    Link,
    /// Marker token in the destination subject.
    Subject,
    /// Legacy ` <display id>` subject suffix.
    LegacySuffix,
}

impl MatchType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Subject => "subject",
            Self::LegacySuffix => "legacy-suffix",
        }
    }
}

/// A destination ticket that already represents a source ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingMatch {
    pub destination_id: String,
    pub match_type: MatchType,
    /// Which phase found the match (1-3).
    pub phase: u8,
}

#[derive(Debug, Clone)]
struct IndexedTicket {
    id: String,
    subject: String,
}

/// Per-run duplicate detector.
#[derive(Debug)]
pub struct DuplicateDetector {
    marker: SubjectMarker,
    legacy_suffix: bool,
    loaded: bool,
    by_marker: HashMap<String, IndexedTicket>,
    unmarked: Vec<TicketSummary>,
}

impl DuplicateDetector {
    #[must_use]
    pub fn new(marker: SubjectMarker, legacy_suffix: bool) -> Self {
        Self {
            marker,
            legacy_suffix,
            loaded: false,
            by_marker: HashMap::new(),
            unmarked: Vec::new(),
        }
    }

    #[must_use]
    pub const fn marker(&self) -> &SubjectMarker {
        &self.marker
    }

    /// Whether a destination ticket already represents `display_id`.
    ///
    /// # Errors
    ///
    /// See [`find_existing`](Self::find_existing).
    pub fn is_imported(
        &mut self,
        store: &mut SqliteStorage,
        destination: &dyn DestinationApi,
        display_id: &str,
    ) -> Result<bool> {
        Ok(self.find_existing(store, destination, display_id)?.is_some())
    }

    /// Find the destination ticket for `display_id`, if any.
    ///
    /// Subject matches unknown to the store are backfilled as `complete` links.
    ///
    /// # Errors
    ///
    /// Returns a `Lookup` error if destination subjects cannot be listed, or a
    /// database error if the store cannot be read or written.
    pub fn find_existing(
        &mut self,
        store: &mut SqliteStorage,
        destination: &dyn DestinationApi,
        display_id: &str,
    ) -> Result<Option<ExistingMatch>> {
        let display_id = display_id.trim();

        // Phase 1: cross-reference store
        if let Some(link) = store.get_link(display_id)? {
            return Ok(Some(ExistingMatch {
                destination_id: link.destination_id,
                match_type: MatchType::Link,
                phase: 1,
            }));
        }

        self.ensure_index(destination)?;

        // Phase 2: marker token
        if let Some(ticket) = self.by_marker.get(display_id).cloned() {
            backfill(store, display_id, &ticket)?;
            return Ok(Some(ExistingMatch {
                destination_id: ticket.id,
                match_type: MatchType::Subject,
                phase: 2,
            }));
        }

        // Phase 3: legacy suffix
        if self.legacy_suffix {
            let suffix = format!(" {display_id}");
            if let Some(summary) = self
                .unmarked
                .iter()
                .find(|t| t.subject.trim_end().ends_with(&suffix))
            {
                let ticket = IndexedTicket {
                    id: summary.id.clone(),
                    subject: summary.subject.clone(),
                };
                backfill(store, display_id, &ticket)?;
                return Ok(Some(ExistingMatch {
                    destination_id: ticket.id,
                    match_type: MatchType::LegacySuffix,
                    phase: 3,
                }));
            }
        }

        Ok(None)
    }

    /// Make a ticket created during this run visible to later checks.
    pub fn register(&mut self, display_id: &str, destination_id: &str, subject: &str) {
        self.by_marker
            .entry(display_id.trim().to_string())
            .or_insert_with(|| IndexedTicket {
                id: destination_id.to_string(),
                subject: subject.to_string(),
            });
    }

    fn ensure_index(&mut self, destination: &dyn DestinationApi) -> Result<()> {
        if self.loaded {
            return Ok(());
        }

        let summaries = destination
            .list_ticket_subjects()
            .map_err(|source| FerryError::lookup("destination ticket subjects", source))?;
        let total = summaries.len();

        for summary in summaries {
            match self.marker.extract(&summary.subject) {
                Some(id) => {
                    let id = id.to_string();
                    self.by_marker.entry(id).or_insert(IndexedTicket {
                        id: summary.id,
                        subject: summary.subject,
                    });
                }
                None if self.legacy_suffix => self.unmarked.push(summary),
                None => {}
            }
        }

        self.loaded = true;
        debug!(
            total,
            marked = self.by_marker.len(),
            unmarked = self.unmarked.len(),
            "Indexed destination subjects"
        );
        Ok(())
    }
}

fn backfill(store: &mut SqliteStorage, display_id: &str, ticket: &IndexedTicket) -> Result<()> {
    store.record_link(&Link::new(
        display_id,
        &ticket.id,
        &ticket.subject,
        LinkState::Complete,
    ))?;
    info!(source_id = %display_id, destination_id = %ticket.id, "Backfilled link from destination subject");
    Ok(())
}
