//! SuperOps (source) GraphQL client.
//!
//! Tickets are enumerated per client account, the same way the SuperOps UI
//! scopes them. A ticket's thread is the union of its conversations and its
//! notes; bodies are converted from HTML to plain text here so the engine only
//! ever sees text.

use super::http::{HttpClient, HttpSettings};
use super::{ApiError, ApiResult, SourceApi};
use crate::model::{ConversationEntry, EntryKind, SourceTicketHeader, SourcePerson, Visibility};
use crate::util::{parse_source_timestamp, strip_html};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.superops.ai/msp";

const QUERY_CLIENT_LIST: &str = "query getClientList($input: ListInfoInput!) { getClientList(input: $input) { clients { accountId name } listInfo { hasMore } } }";
const QUERY_TICKET_LIST: &str = "query getTicketList($input: ListInfoInput!) { getTicketList(input: $input) { tickets { ticketId displayId subject status priority createdTime } listInfo { hasMore totalCount } } }";
const QUERY_CONVERSATIONS: &str = "query getTicketConversationList($input: TicketIdentifierInput!) { getTicketConversationList(input: $input) { conversationId content time user toUsers { user } type } }";
const QUERY_NOTES: &str = "query getTicketNoteList($input: TicketIdentifierInput!) { getTicketNoteList(input: $input) { noteId addedBy addedOn content privacyType } }";

const CLIENT_PAGE_SIZE: u32 = 100;
const TICKET_PAGE_SIZE: u32 = 50;

/// Blocking SuperOps API client.
#[derive(Debug)]
pub struct SuperOpsClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    subdomain: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListInfo {
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientListData {
    get_client_list: Option<ClientPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientPage {
    #[serde(default)]
    clients: Vec<Client>,
    #[serde(default)]
    list_info: ListInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Client {
    account_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketListData {
    get_ticket_list: Option<TicketPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketPage {
    #[serde(default)]
    tickets: Vec<Ticket>,
    #[serde(default)]
    list_info: ListInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticket {
    ticket_id: Option<String>,
    display_id: Option<Value>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    created_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationData {
    get_ticket_conversation_list: Option<Vec<Conversation>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Conversation {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    user: Option<Value>,
    #[serde(default)]
    to_users: Option<Vec<Recipient>>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Recipient {
    #[serde(default)]
    user: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteData {
    get_ticket_note_list: Option<Vec<Note>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Note {
    #[serde(default)]
    added_by: Option<Value>,
    #[serde(default)]
    added_on: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    privacy_type: Option<String>,
}

impl SuperOpsClient {
    /// Create a client for one SuperOps tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: &str,
        subdomain: &str,
        settings: HttpSettings,
    ) -> ApiResult<Self> {
        Ok(Self {
            http: HttpClient::new("superops", settings)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            subdomain: subdomain.to_string(),
        })
    }

    fn query<T: DeserializeOwned>(&self, what: &str, query: &str, variables: &Value) -> ApiResult<T> {
        let payload = json!({ "query": query, "variables": variables });
        let response: GraphQlResponse<T> = self.http.execute(what, |client| {
            client
                .post(&self.base_url)
                .bearer_auth(&self.api_key)
                .header("CustomerSubDomain", &self.subdomain)
                .json(&payload)
        })?;

        if let Some(first) = response.errors.first() {
            let message = first.message.clone();
            if message.to_ascii_lowercase().contains("unauthori") {
                return Err(ApiError::Unauthorized {
                    system: "superops".to_string(),
                    detail: message,
                });
            }
            return Err(ApiError::Decode(format!("{what}: {message}")));
        }

        response
            .data
            .ok_or_else(|| ApiError::Decode(format!("{what}: response has no data")))
    }

    fn list_clients(&self) -> ApiResult<Vec<Client>> {
        let mut clients = Vec::new();
        let mut page = 1;
        loop {
            let variables = json!({ "input": { "page": page, "pageSize": CLIENT_PAGE_SIZE } });
            let data: ClientListData = self.query("client list", QUERY_CLIENT_LIST, &variables)?;
            let Some(batch) = data.get_client_list else {
                break;
            };
            clients.extend(batch.clients);
            if !batch.list_info.has_more {
                break;
            }
            page += 1;
        }
        info!(count = clients.len(), "Listed SuperOps clients");
        Ok(clients)
    }

    fn list_client_tickets(&self, client: &Client) -> ApiResult<Vec<SourceTicketHeader>> {
        let mut headers = Vec::new();
        let mut page = 1;
        loop {
            let variables = json!({
                "input": {
                    "page": page,
                    "pageSize": TICKET_PAGE_SIZE,
                    "condition": {
                        "joinOperator": "AND",
                        "operands": [{
                            "attribute": "client.accountId",
                            // Account ids are opaque; `contains` would also match id prefixes.
                            "operator": "is",
                            "value": client.account_id,
                        }]
                    }
                }
            });
            let data: TicketListData = self.query("ticket list", QUERY_TICKET_LIST, &variables)?;
            let Some(batch) = data.get_ticket_list else {
                break;
            };

            for ticket in batch.tickets {
                if let Some(header) = header_from_ticket(ticket, &client.name) {
                    headers.push(header);
                }
            }

            if !batch.list_info.has_more {
                break;
            }
            page += 1;
        }
        debug!(client = %client.name, count = headers.len(), "Listed client tickets");
        Ok(headers)
    }
}

impl SourceApi for SuperOpsClient {
    fn list_tickets(&self) -> ApiResult<Vec<SourceTicketHeader>> {
        let mut headers = Vec::new();
        for client in self.list_clients()? {
            headers.extend(self.list_client_tickets(&client)?);
        }
        Ok(headers)
    }

    fn list_conversations(&self, ticket_id: &str) -> ApiResult<Vec<ConversationEntry>> {
        let variables = json!({ "input": { "ticketId": ticket_id } });

        let conversations: ConversationData =
            self.query("conversation list", QUERY_CONVERSATIONS, &variables)?;
        let notes: NoteData = self.query("note list", QUERY_NOTES, &variables)?;

        let mut entries = Vec::new();
        for conversation in conversations.get_ticket_conversation_list.unwrap_or_default() {
            entries.extend(entry_from_conversation(conversation, ticket_id));
        }
        for note in notes.get_ticket_note_list.unwrap_or_default() {
            entries.extend(entry_from_note(note, ticket_id));
        }
        debug!(ticket_id, count = entries.len(), "Loaded ticket thread");
        Ok(entries)
    }
}

fn header_from_ticket(ticket: Ticket, customer: &str) -> Option<SourceTicketHeader> {
    let ticket_id = ticket.ticket_id.filter(|id| !id.trim().is_empty())?;
    let Some(display_id) = ticket.display_id.as_ref().and_then(value_to_string) else {
        warn!(ticket_id = %ticket_id, "Ticket has no display id, skipping");
        return None;
    };
    let Some(subject) = ticket.subject.filter(|s| !s.trim().is_empty()) else {
        warn!(ticket_id = %ticket_id, %display_id, "Ticket has no subject, skipping");
        return None;
    };
    let Some(created_at) = ticket.created_time.as_deref().and_then(parse_source_timestamp) else {
        warn!(ticket_id = %ticket_id, %display_id, "Ticket has no parseable created time, skipping");
        return None;
    };

    Some(SourceTicketHeader {
        ticket_id,
        display_id,
        subject,
        customer: customer.to_string(),
        status: ticket.status,
        priority: ticket.priority,
        issue_type: None,
        created_at,
    })
}

fn entry_from_conversation(conversation: Conversation, ticket_id: &str) -> Option<ConversationEntry> {
    let created_at = entry_time(conversation.time.as_deref(), ticket_id)?;
    let author = conversation
        .user
        .as_ref()
        .and_then(person_from_value)
        .unwrap_or_else(|| {
            warn!(ticket_id, "Conversation entry is missing user info");
            SourcePerson::named("Unknown")
        });
    let recipients = conversation
        .to_users
        .unwrap_or_default()
        .iter()
        .filter_map(|r| r.user.as_ref().and_then(person_from_value))
        .collect();

    Some(ConversationEntry {
        kind: EntryKind::from_source_tag(conversation.kind.as_deref().unwrap_or("OTHER")),
        author,
        created_at,
        body: strip_html(conversation.content.as_deref().unwrap_or_default()),
        visibility: Visibility::Public,
        recipients,
    })
}

fn entry_from_note(note: Note, ticket_id: &str) -> Option<ConversationEntry> {
    let created_at = entry_time(note.added_on.as_deref(), ticket_id)?;
    let author = note
        .added_by
        .as_ref()
        .and_then(person_from_value)
        .unwrap_or_else(|| {
            warn!(ticket_id, "Note is missing author info");
            SourcePerson::named("Unknown")
        });
    let visibility = match note.privacy_type.as_deref() {
        Some(value) if value.eq_ignore_ascii_case("public") => Visibility::Public,
        _ => Visibility::Private,
    };

    Some(ConversationEntry {
        kind: EntryKind::Note,
        author,
        created_at,
        body: strip_html(note.content.as_deref().unwrap_or_default()),
        visibility,
        recipients: Vec::new(),
    })
}

/// Entries without a usable timestamp cannot be placed in the thread and are dropped.
fn entry_time(raw: Option<&str>, ticket_id: &str) -> Option<DateTime<Utc>> {
    let parsed = raw.and_then(parse_source_timestamp);
    if parsed.is_none() {
        warn!(ticket_id, time = raw.unwrap_or_default(), "Thread entry has no parseable time, skipping");
    }
    parsed
}

/// SuperOps returns people as JSON scalars: either an object with
/// `name`/`email` or a bare string.
fn person_from_value(value: &Value) -> Option<SourcePerson> {
    match value {
        Value::Object(map) => {
            let name = map.get("name").and_then(Value::as_str).unwrap_or_default();
            let email = map
                .get("email")
                .and_then(Value::as_str)
                .filter(|e| !e.trim().is_empty())
                .map(str::to_string);
            let person = SourcePerson {
                name: name.to_string(),
                email,
            };
            (!person.is_blank()).then_some(person)
        }
        Value::String(name) if !name.trim().is_empty() => Some(SourcePerson::named(name.clone())),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_from_object_and_string() {
        let person = person_from_value(&json!({"name": "Ann Tech", "email": "ann@msp.io"})).unwrap();
        assert_eq!(person.name, "Ann Tech");
        assert_eq!(person.email.as_deref(), Some("ann@msp.io"));

        let person = person_from_value(&json!("Bob")).unwrap();
        assert_eq!(person.name, "Bob");
        assert!(person_from_value(&json!({})).is_none());
        assert!(person_from_value(&Value::Null).is_none());
    }

    #[test]
    fn header_requires_ids() {
        let ticket = Ticket {
            ticket_id: Some("9001".to_string()),
            display_id: Some(json!(1042)),
            subject: Some("Printer jam".to_string()),
            status: Some("Open".to_string()),
            priority: None,
            created_time: Some("2024-05-01T12:00:00".to_string()),
        };
        let header = header_from_ticket(ticket, "Acme").unwrap();
        assert_eq!(header.display_id, "1042");
        assert_eq!(header.customer, "Acme");

        let ticket = Ticket {
            ticket_id: Some("9002".to_string()),
            display_id: None,
            subject: None,
            status: None,
            priority: None,
            created_time: None,
        };
        assert!(header_from_ticket(ticket, "Acme").is_none());
    }

    #[test]
    fn note_privacy_defaults_to_private() {
        let note = Note {
            added_by: Some(json!({"name": "Ann"})),
            added_on: Some("2024-05-01T12:00:00".to_string()),
            content: Some("<p>checked toner</p>".to_string()),
            privacy_type: None,
        };
        let entry = entry_from_note(note, "9001").unwrap();
        assert_eq!(entry.visibility, Visibility::Private);
        assert_eq!(entry.body, "checked toner");
        assert_eq!(entry.kind, EntryKind::Note);
    }

    #[test]
    fn conversation_parses_recipients() {
        let raw = json!({
            "content": "Hello",
            "time": "2024-05-01T12:00:00",
            "user": {"name": "Ann"},
            "toUsers": [{"user": {"name": "Carl", "email": "carl@acme.test"}}],
            "type": "TECH_REPLY"
        });
        let conversation: Conversation = serde_json::from_value(raw).unwrap();
        let entry = entry_from_conversation(conversation, "9001").unwrap();
        assert_eq!(entry.kind, EntryKind::TechReply);
        assert_eq!(entry.recipients.len(), 1);
        assert_eq!(entry.recipients[0].email.as_deref(), Some("carl@acme.test"));
    }

    #[test]
    fn header_without_subject_or_created_time_is_skipped() {
        let raw = json!({"ticketId": "t1", "displayId": 1042});
        let ticket: Ticket = serde_json::from_value(raw).unwrap();
        assert!(header_from_ticket(ticket, "Acme").is_none());

        let raw = json!({
            "ticketId": "t1",
            "displayId": 1042,
            "subject": "   ",
            "createdTime": "2024-05-01T12:00:00"
        });
        let ticket: Ticket = serde_json::from_value(raw).unwrap();
        assert!(header_from_ticket(ticket, "Acme").is_none());

        let raw = json!({
            "ticketId": "t1",
            "displayId": 1042,
            "subject": "Printer jam",
            "createdTime": "not a date"
        });
        let ticket: Ticket = serde_json::from_value(raw).unwrap();
        assert!(header_from_ticket(ticket, "Acme").is_none());
    }

    #[test]
    fn thread_entries_without_time_are_dropped() {
        let raw = json!({"content": "Hello", "user": {"name": "Ann"}, "type": "DESCRIPTION"});
        let conversation: Conversation = serde_json::from_value(raw).unwrap();
        assert!(entry_from_conversation(conversation, "9001").is_none());

        let raw = json!({"content": "Hi", "time": "yesterday", "type": "TECH_REPLY"});
        let conversation: Conversation = serde_json::from_value(raw).unwrap();
        assert!(entry_from_conversation(conversation, "9001").is_none());

        let note = Note {
            added_by: Some(json!({"name": "Ann"})),
            added_on: None,
            content: Some("checked toner".to_string()),
            privacy_type: None,
        };
        assert!(entry_from_note(note, "9001").is_none());
    }
}
