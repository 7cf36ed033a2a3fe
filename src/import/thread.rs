//! Assemble a [`SourceTicket`] from a header and its raw thread.

use crate::model::{ConversationEntry, EntryKind, SourcePerson, SourceTicket, SourceTicketHeader};

/// Build the full source ticket.
///
/// - The first `Description` entry becomes the ticket description and is not
///   kept as a conversation entry.
/// - The technician is the author of the earliest tech reply; the contact is
///   that reply's first recipient.
/// - Everything else is kept, sorted by time. Entries with equal timestamps
///   keep the order the source returned them in.
#[must_use]
pub fn assemble_ticket(header: SourceTicketHeader, mut entries: Vec<ConversationEntry>) -> SourceTicket {
    entries.sort_by_key(|entry| entry.created_at);

    let description_index = entries
        .iter()
        .position(|entry| entry.kind == EntryKind::Description);
    let description = description_index
        .map(|index| entries.remove(index).body)
        .map(|body| body.trim().to_string())
        .filter(|body| !body.is_empty());

    let first_tech_reply = entries.iter().find(|entry| entry.kind == EntryKind::TechReply);
    let technician = first_tech_reply
        .map(|reply| reply.author.clone())
        .filter(|person| !person.is_blank());
    let contact = first_tech_reply
        .and_then(|reply| reply.recipients.iter().find(|p| !p.is_blank()))
        .cloned();

    SourceTicket {
        ticket_id: header.ticket_id,
        display_id: header.display_id,
        subject: header.subject,
        description,
        customer: header.customer,
        contact,
        technician,
        status: header.status,
        priority: header.priority,
        issue_type: header.issue_type,
        created_at: header.created_at,
        conversation: entries,
    }
}

/// Display form of a comment author.
pub(crate) fn author_label(person: &SourcePerson) -> String {
    let name = person.name.trim();
    match person.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) if name.is_empty() => email.to_string(),
        Some(email) => format!("{name} <{email}>"),
        None if name.is_empty() => "Unknown".to_string(),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Visibility;
    use chrono::{TimeZone, Utc};

    fn header() -> SourceTicketHeader {
        SourceTicketHeader {
            ticket_id: "t-1".to_string(),
            display_id: "1042".to_string(),
            subject: "Printer jam".to_string(),
            customer: "Acme Corp".to_string(),
            status: Some("Closed".to_string()),
            priority: None,
            issue_type: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        }
    }

    fn entry(kind: EntryKind, author: &str, hour: u32, body: &str) -> ConversationEntry {
        ConversationEntry {
            kind,
            author: SourcePerson::named(author),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            body: body.to_string(),
            visibility: Visibility::Public,
            recipients: Vec::new(),
        }
    }

    #[test]
    fn description_is_lifted_out_of_the_thread() {
        let entries = vec![
            entry(EntryKind::CustomerReply, "Carl", 11, "still jammed"),
            entry(EntryKind::Description, "Carl", 9, "<p>It jams</p>"),
        ];
        let ticket = assemble_ticket(header(), entries);
        assert_eq!(ticket.description.as_deref(), Some("<p>It jams</p>"));
        assert_eq!(ticket.conversation.len(), 1);
        assert_eq!(ticket.conversation[0].body, "still jammed");
    }

    #[test]
    fn earliest_tech_reply_sets_technician_and_contact() {
        let mut first = entry(EntryKind::TechReply, "Tina", 10, "on it");
        first.recipients = vec![SourcePerson {
            name: "Carl User".to_string(),
            email: Some("carl@acme.test".to_string()),
        }];
        let later = entry(EntryKind::TechReply, "Bob", 12, "fixed");

        let ticket = assemble_ticket(header(), vec![later, first]);
        assert_eq!(ticket.technician.unwrap().name, "Tina");
        assert_eq!(ticket.contact.unwrap().email.as_deref(), Some("carl@acme.test"));
        assert_eq!(ticket.conversation[0].author.name, "Tina");
        assert_eq!(ticket.conversation[1].author.name, "Bob");
    }

    #[test]
    fn ties_keep_source_order() {
        let entries = vec![
            entry(EntryKind::Note, "A", 10, "first"),
            entry(EntryKind::Note, "B", 10, "second"),
        ];
        let ticket = assemble_ticket(header(), entries);
        assert_eq!(ticket.conversation[0].body, "first");
        assert_eq!(ticket.conversation[1].body, "second");
        assert!(ticket.description.is_none());
        assert!(ticket.technician.is_none());
    }

    #[test]
    fn author_labels() {
        assert_eq!(author_label(&SourcePerson::named("Ann")), "Ann");
        assert_eq!(author_label(&SourcePerson::default()), "Unknown");
        let both = SourcePerson {
            name: "Ann".to_string(),
            email: Some("ann@x.test".to_string()),
        };
        assert_eq!(author_label(&both), "Ann <ann@x.test>");
    }
}
