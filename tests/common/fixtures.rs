//! Ticket and reference data builders.

use super::fakes::{FakeDestination, FakeSource};
use chrono::{DateTime, Duration, TimeZone, Utc};
use ticket_ferry::model::{
    ConversationEntry, EntityKind, EntryKind, ReferenceEntity, SourcePerson, SourceTicketHeader,
    Visibility,
};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0)
        .single()
        .expect("valid fixture time")
}

pub fn header(display_id: &str, subject: &str, customer: &str) -> SourceTicketHeader {
    SourceTicketHeader {
        ticket_id: format!("so-{display_id}"),
        display_id: display_id.to_string(),
        subject: subject.to_string(),
        customer: customer.to_string(),
        status: Some("Resolved".to_string()),
        priority: Some("Medium".to_string()),
        issue_type: Some("Hardware".to_string()),
        created_at: base_time(),
    }
}

pub fn person(name: &str, email: &str) -> SourcePerson {
    SourcePerson {
        name: name.to_string(),
        email: Some(email.to_string()),
    }
}

pub fn entry(kind: EntryKind, author: SourcePerson, minutes: i64, body: &str) -> ConversationEntry {
    ConversationEntry {
        kind,
        author,
        created_at: base_time() + Duration::minutes(minutes),
        body: body.to_string(),
        visibility: Visibility::Public,
        recipients: Vec::new(),
    }
}

/// Description, a tech reply addressed to the contact, and a private note.
pub fn standard_thread(contact: &SourcePerson) -> Vec<ConversationEntry> {
    let tech = person("Tina Tech", "tina@msp.example");
    let mut reply = entry(
        EntryKind::TechReply,
        tech.clone(),
        30,
        "Cleared the jam, please retry.",
    );
    reply.recipients = vec![contact.clone()];
    let mut note = entry(EntryKind::Note, tech, 45, "Fuser looks worn.");
    note.visibility = Visibility::Private;

    // Deliberately out of order; assembly sorts by time.
    vec![
        note,
        entry(
            EntryKind::Description,
            contact.clone(),
            0,
            "<div>The printer on floor 2 is jammed.</div>",
        ),
        reply,
    ]
}

pub fn carl() -> SourcePerson {
    person("Carl Contact", "carl@acme.example")
}

/// The printer jam ticket of Acme Corp.
pub fn printer_jam(display_id: &str) -> (SourceTicketHeader, Vec<ConversationEntry>) {
    (
        header(display_id, "Printer jam", "Acme Corp"),
        standard_thread(&carl()),
    )
}

/// Destination with Acme Corp, one technician and the default status and type.
pub fn reference_destination() -> FakeDestination {
    FakeDestination::new()
        .with_reference(
            EntityKind::Customer,
            vec![
                ReferenceEntity::named("10", "Acme Corp"),
                ReferenceEntity::named("11", "Globex"),
            ],
        )
        .with_reference(
            EntityKind::Technician,
            vec![ReferenceEntity {
                id: "20".to_string(),
                name: "Tina Tech".to_string(),
                email: Some("tina@msp.example".to_string()),
            }],
        )
        .with_reference(EntityKind::Contact, Vec::new())
        .with_reference(
            EntityKind::Status,
            vec![
                ReferenceEntity::named("Resolved", "Resolved"),
                ReferenceEntity::named("New", "New"),
            ],
        )
        .with_reference(
            EntityKind::IssueType,
            vec![ReferenceEntity::named("Other", "Other")],
        )
}

/// Source with `count` Acme tickets numbered from 1001.
pub fn acme_source(count: usize) -> FakeSource {
    (0..count).fold(FakeSource::new(), |source, n| {
        let (header, thread) = printer_jam(&(1001 + n).to_string());
        source.with_ticket(header, thread)
    })
}
