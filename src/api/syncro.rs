//! Syncro (destination) REST client.

use super::http::{HttpClient, HttpSettings};
use super::{ApiError, ApiResult, DestinationApi};
use crate::model::{
    CreatedTicket, EntityKind, NewComment, NewEntity, NewTicket, ReferenceEntity, TicketSummary,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

/// Safety cap on paginated listings.
const MAX_PAGES: u32 = 10_000;

/// Blocking Syncro API client.
#[derive(Debug)]
pub struct SyncroClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    total_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CustomerPage {
    #[serde(default)]
    customers: Vec<Customer>,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct Customer {
    id: Value,
    #[serde(default)]
    business_name: Option<String>,
    #[serde(default)]
    fullname: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContactPage {
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct Contact {
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserList {
    #[serde(default)]
    users: Vec<(Value, String)>,
}

#[derive(Debug, Deserialize)]
struct TicketSettings {
    #[serde(default)]
    ticket_status_list: Vec<String>,
    #[serde(default)]
    problem_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TicketPage {
    #[serde(default)]
    tickets: Vec<Ticket>,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct Ticket {
    id: Value,
    #[serde(default)]
    number: Option<Value>,
    #[serde(default)]
    subject: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TicketEnvelope {
    ticket: Ticket,
}

impl SyncroClient {
    /// Create a client for one Syncro account, e.g. `https://acme.syncromsp.com/api/v1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str, settings: HttpSettings) -> ApiResult<Self> {
        Ok(Self {
            http: HttpClient::new("syncro", settings)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get<T: DeserializeOwned>(&self, what: &str, path: &str, page: Option<u32>) -> ApiResult<T> {
        let url = self.url(path);
        self.http.execute(what, |client| {
            let request = client.get(&url).bearer_auth(&self.api_key);
            match page {
                Some(page) => request.query(&[("page", page)]),
                None => request,
            }
        })
    }

    fn post<T: DeserializeOwned>(&self, what: &str, path: &str, body: &Value) -> ApiResult<T> {
        let url = self.url(path);
        self.http
            .execute(what, |client| client.post(&url).bearer_auth(&self.api_key).json(body))
    }

    /// Walk a paginated listing until `meta.total_pages` is reached.
    fn paged<P, T, F>(&self, what: &str, path: &str, mut split: F) -> ApiResult<Vec<T>>
    where
        P: DeserializeOwned,
        F: FnMut(P) -> (Vec<T>, Meta),
    {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let body: P = self.get(what, path, Some(page))?;
            let (batch, meta) = split(body);
            let empty = batch.is_empty();
            items.extend(batch);

            let total = meta.total_pages.unwrap_or(1);
            if empty || page >= total || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }
        debug!(what, count = items.len(), "Paged listing complete");
        Ok(items)
    }
}

impl DestinationApi for SyncroClient {
    fn list_reference_entities(&self, kind: EntityKind) -> ApiResult<Vec<ReferenceEntity>> {
        let entities: Vec<ReferenceEntity> = match kind {
            EntityKind::Customer => self
                .paged("customers", "customers", |page: CustomerPage| (page.customers, page.meta))?
                .into_iter()
                .map(customer_entity)
                .collect(),
            EntityKind::Contact => self
                .paged("contacts", "contacts", |page: ContactPage| (page.contacts, page.meta))?
                .into_iter()
                .map(|contact| ReferenceEntity {
                    id: id_string(&contact.id),
                    name: contact.name.unwrap_or_default(),
                    email: contact.email.filter(|e| !e.trim().is_empty()),
                })
                .collect(),
            EntityKind::Technician => {
                let list: UserList = self.get("users", "users", None)?;
                list.users
                    .into_iter()
                    .map(|(id, name)| ReferenceEntity::named(id_string(&id), name))
                    .collect()
            }
            EntityKind::Status | EntityKind::IssueType => {
                let settings: TicketSettings = self.get("ticket settings", "tickets/settings", None)?;
                let names = if kind == EntityKind::Status {
                    settings.ticket_status_list
                } else {
                    settings.problem_types
                };
                names
                    .into_iter()
                    .map(|name| ReferenceEntity::named(name.clone(), name))
                    .collect()
            }
        };
        info!(%kind, count = entities.len(), "Listed Syncro reference entities");
        Ok(entities)
    }

    fn list_ticket_subjects(&self) -> ApiResult<Vec<TicketSummary>> {
        let tickets = self.paged("tickets", "tickets", |page: TicketPage| (page.tickets, page.meta))?;
        Ok(tickets
            .into_iter()
            .map(|ticket| TicketSummary {
                id: id_string(&ticket.id),
                subject: ticket.subject.unwrap_or_default(),
            })
            .collect())
    }

    fn create_ticket(&self, ticket: &NewTicket) -> ApiResult<CreatedTicket> {
        let body = json!({
            "customer_id": ticket.customer_id,
            "contact_id": ticket.contact_id,
            "user_id": ticket.technician_id,
            "subject": ticket.subject,
            "status": ticket.status,
            "problem_type": ticket.issue_type,
            "priority": ticket.priority,
            "created_at": ticket.created_at,
            "comments_attributes": [{
                "subject": "Initial Issue",
                "body": ticket.body,
                "hidden": true,
                "do_not_email": true,
            }],
        });
        let envelope: TicketEnvelope = self.post("create ticket", "tickets", &body)?;
        created_ticket(&envelope)
    }

    fn create_comment(&self, ticket_id: &str, comment: &NewComment) -> ApiResult<()> {
        let body = json!({
            "subject": comment.subject,
            "body": comment.body,
            "tech": comment.author,
            "hidden": comment.hidden,
            "do_not_email": comment.do_not_email,
        });
        let _: Value = self.post("create comment", &format!("tickets/{ticket_id}/comment"), &body)?;
        Ok(())
    }

    fn create_entity(&self, kind: EntityKind, fields: &NewEntity) -> ApiResult<ReferenceEntity> {
        let (path, body, key) = match kind {
            EntityKind::Customer => (
                "customers",
                json!({ "business_name": fields.name, "email": fields.email }),
                "customer",
            ),
            EntityKind::Contact => (
                "contacts",
                json!({
                    "customer_id": fields.customer_id,
                    "name": fields.name,
                    "email": fields.email,
                }),
                "contact",
            ),
            other => {
                return Err(ApiError::Unsupported(format!(
                    "Syncro cannot create {other} entities"
                )));
            }
        };

        let response: Value = self.post(&format!("create {key}"), path, &body)?;
        let object = response.get(key).unwrap_or(&response);
        let id = object
            .get("id")
            .map(id_string)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Decode(format!("create {key}: response has no id")))?;

        Ok(ReferenceEntity {
            id,
            name: fields.name.clone(),
            email: fields.email.clone(),
        })
    }
}

fn created_ticket(envelope: &TicketEnvelope) -> ApiResult<CreatedTicket> {
    let id = id_string(&envelope.ticket.id);
    if id.is_empty() {
        return Err(ApiError::Decode("create ticket: response has no id".to_string()));
    }
    Ok(CreatedTicket {
        id,
        number: envelope.ticket.number.as_ref().map(id_string),
    })
}

fn customer_entity(customer: Customer) -> ReferenceEntity {
    let name = customer
        .business_name
        .filter(|n| !n.trim().is_empty())
        .or(customer.fullname)
        .unwrap_or_default();
    ReferenceEntity {
        id: id_string(&customer.id),
        name,
        email: customer.email.filter(|e| !e.trim().is_empty()),
    }
}

/// Syncro ids are JSON numbers; everything downstream treats ids as strings.
fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}
