//! Ticket importer.
//!
//! Imports one assembled [`SourceTicket`] at a time:
//! 1. Cutoff check (tickets created before the cutoff are skipped)
//! 2. Duplicate check
//! 3. Identity resolution (customer, contact, technician, status, issue type)
//! 4. Destination ticket creation, recorded as a `partial` link
//! 5. One private comment per conversation entry, in order
//! 6. Link promoted to `complete`
//!
//! Every step is a commit point. A failure after step 4 leaves the ticket and
//! the comments created so far in place and reports them in the failed
//! [`ImportRecord`].

mod thread;

pub use thread::assemble_ticket;

use crate::api::DestinationApi;
use crate::cache::ReferenceSnapshot;
use crate::dedup::{DuplicateDetector, SubjectMarker};
use crate::error::{FerryError, Result};
use crate::model::{
    ConversationEntry, EntityKind, ImportRecord, NewComment, NewTicket, SourceTicket,
    SourceTicketHeader,
};
use crate::resolve::{IdentityResolver, SourceEntity};
use crate::storage::{Link, LinkState, METADATA_LAST_RUN_AT, SqliteStorage};
use crate::util::{format_for_destination, strip_html};
use chrono::{DateTime, FixedOffset, Utc};
use thread::author_label;
use tracing::{debug, info, warn};

/// Ticket body used when the source has no description.
pub const EMPTY_DESCRIPTION: &str = "No description available.";

/// Per-run importer settings.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Tickets created before this instant are skipped.
    pub cutoff: Option<DateTime<Utc>>,
    /// Offset the destination expects creation times in.
    pub utc_offset: FixedOffset,
    pub marker: SubjectMarker,
    /// Also treat ` <display id>` subject suffixes as duplicates.
    pub legacy_suffix: bool,
}

/// Imports source tickets into the destination.
pub struct TicketImporter<'a> {
    destination: &'a dyn DestinationApi,
    store: &'a mut SqliteStorage,
    snapshot: &'a mut ReferenceSnapshot,
    resolver: IdentityResolver,
    detector: DuplicateDetector,
    cutoff: Option<DateTime<Utc>>,
    utc_offset: FixedOffset,
}

impl<'a> TicketImporter<'a> {
    #[must_use]
    pub fn new(
        destination: &'a dyn DestinationApi,
        store: &'a mut SqliteStorage,
        snapshot: &'a mut ReferenceSnapshot,
        resolver: IdentityResolver,
        settings: ImportSettings,
    ) -> Self {
        Self {
            destination,
            store,
            snapshot,
            resolver,
            detector: DuplicateDetector::new(settings.marker, settings.legacy_suffix),
            cutoff: settings.cutoff,
            utc_offset: settings.utc_offset,
        }
    }

    /// Decide from the header alone whether the ticket can be skipped.
    ///
    /// Lets the run driver avoid loading threads of tickets that will not be
    /// imported. `Ok(None)` means the ticket still needs a full import.
    ///
    /// # Errors
    ///
    /// Returns only fatal errors; per-ticket failures become failed records.
    pub fn precheck(&mut self, header: &SourceTicketHeader) -> Result<Option<ImportRecord>> {
        self.screen(&header.display_id, header.created_at)
    }

    /// Import one source ticket.
    ///
    /// # Errors
    ///
    /// Returns only fatal errors (authentication, local database). Every other
    /// failure is reported as a `failed` record.
    pub fn import(&mut self, ticket: &SourceTicket) -> Result<ImportRecord> {
        let source_id = ticket.display_id.as_str();

        // Steps 1-2: cutoff and duplicate checks
        if let Some(record) = self.screen(source_id, ticket.created_at)? {
            return Ok(record);
        }

        // Step 3: resolve identities
        let payload = match self.build_ticket(ticket) {
            Ok(payload) => payload,
            Err(err) => return fail(source_id, None, 0, err),
        };

        // Step 4: create the destination ticket
        let created = match self
            .destination
            .create_ticket(&payload)
            .map_err(|source| FerryError::creation("destination ticket", source))
        {
            Ok(created) => created,
            Err(err) => return fail(source_id, None, 0, err),
        };
        self.detector.register(source_id, &created.id, &payload.subject);
        self.store.record_link(&Link::new(
            source_id,
            &created.id,
            &payload.subject,
            LinkState::Partial,
        ))?;
        debug!(source_id, destination_id = %created.id, "Created destination ticket");

        // Step 5: replicate the thread as private comments
        let total = ticket.conversation.len();
        let mut comments_created = 0;
        for entry in &ticket.conversation {
            let comment = self.comment_for(entry);
            if let Err(source) = self.destination.create_comment(&created.id, &comment) {
                let err = FerryError::creation(
                    format!("comment {} of {total}", comments_created + 1),
                    source,
                );
                self.store
                    .update_link_progress(source_id, comments_created, LinkState::Partial)?;
                return fail(source_id, Some(&created.id), comments_created, err);
            }
            comments_created += 1;
        }

        // Step 6: mark complete
        self.store
            .update_link_progress(source_id, comments_created, LinkState::Complete)?;
        info!(
            source_id,
            destination_id = %created.id,
            comments = comments_created,
            "Imported ticket"
        );
        Ok(ImportRecord::created(source_id, &created.id, comments_created))
    }

    /// Stamp the cross-reference store with the end of a run.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata write fails.
    pub fn record_run(&mut self, finished_at: DateTime<Utc>) -> Result<()> {
        self.store
            .set_metadata(METADATA_LAST_RUN_AT, &finished_at.to_rfc3339())
    }

    fn screen(
        &mut self,
        source_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Option<ImportRecord>> {
        if let Some(cutoff) = self.cutoff {
            if created_at < cutoff {
                debug!(source_id, %created_at, %cutoff, "Created before cutoff, skipping");
                return Ok(Some(ImportRecord::skipped_cutoff(source_id)));
            }
        }

        match self
            .detector
            .find_existing(self.store, self.destination, source_id)
        {
            Ok(Some(existing)) => {
                info!(
                    source_id,
                    destination_id = %existing.destination_id,
                    matched_by = existing.match_type.as_str(),
                    "Already imported, skipping"
                );
                Ok(Some(ImportRecord::skipped_duplicate(
                    source_id,
                    Some(&existing.destination_id),
                )))
            }
            Ok(None) => Ok(None),
            Err(err) => fail(source_id, None, 0, err).map(Some),
        }
    }

    fn build_ticket(&mut self, ticket: &SourceTicket) -> Result<NewTicket> {
        let customer_id = self
            .resolve(EntityKind::Customer, &SourceEntity::named(ticket.customer.as_str()))?
            .ok_or_else(|| {
                FerryError::resolution(
                    EntityKind::Customer,
                    ticket.customer.as_str(),
                    "every ticket needs a customer",
                )
            })?;

        let contact_id = match ticket.contact.as_ref().filter(|p| !p.is_blank()) {
            Some(person) => self.resolve(
                EntityKind::Contact,
                &SourceEntity::from_person(person).with_customer(&customer_id),
            )?,
            None => None,
        };

        let technician_id = match ticket.technician.as_ref().filter(|p| !p.is_blank()) {
            Some(person) => {
                self.resolve(EntityKind::Technician, &SourceEntity::from_person(person))?
            }
            None => None,
        };

        let status = self.resolve(
            EntityKind::Status,
            &SourceEntity::named(ticket.status.as_deref().unwrap_or_default()),
        )?;
        let issue_type = self.resolve(
            EntityKind::IssueType,
            &SourceEntity::named(ticket.issue_type.as_deref().unwrap_or_default()),
        )?;

        let body = ticket
            .description
            .as_deref()
            .map(strip_html)
            .filter(|body| !body.trim().is_empty())
            .unwrap_or_else(|| EMPTY_DESCRIPTION.to_string());

        Ok(NewTicket {
            customer_id,
            contact_id,
            technician_id,
            subject: self
                .detector
                .marker()
                .embed(&ticket.subject, &ticket.display_id),
            body,
            status,
            issue_type,
            priority: ticket.priority.clone(),
            created_at: format_for_destination(ticket.created_at, self.utc_offset),
        })
    }

    fn resolve(&mut self, kind: EntityKind, entity: &SourceEntity) -> Result<Option<String>> {
        self.resolver
            .resolve(self.snapshot, kind, entity, self.destination)
    }

    fn comment_for(&self, entry: &ConversationEntry) -> NewComment {
        let author = author_label(&entry.author);
        let posted = format_for_destination(entry.created_at, self.utc_offset);
        let body = entry.body.trim();
        let body = if body.is_empty() { "(empty)" } else { body };

        NewComment {
            subject: entry.kind.label().to_string(),
            body: format!(
                "From: {author}\nDate: {posted}\nVisibility: {}\n\n{body}",
                entry.visibility.as_str()
            ),
            author,
            hidden: true,
            do_not_email: true,
        }
    }
}

/// Turn a per-ticket error into a failed record; fatal errors propagate.
fn fail(
    source_id: &str,
    destination_id: Option<&str>,
    comments_created: usize,
    err: FerryError,
) -> Result<ImportRecord> {
    if err.is_fatal() {
        return Err(err);
    }
    warn!(source_id, destination_id, comments_created, error = %err, "Ticket import failed");
    Ok(ImportRecord::failed(
        source_id,
        destination_id,
        comments_created,
        &err.to_string(),
    ))
}
