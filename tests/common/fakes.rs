//! In-memory stand-ins for the two helpdesk APIs.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use ticket_ferry::api::{ApiError, ApiResult, DestinationApi, SourceApi};
use ticket_ferry::model::{
    ConversationEntry, CreatedTicket, EntityKind, NewComment, NewEntity, NewTicket,
    ReferenceEntity, SourceTicketHeader, TicketSummary,
};

fn unauthorized(system: &str) -> ApiError {
    ApiError::Unauthorized {
        system: system.to_string(),
        detail: "401 Unauthorized".to_string(),
    }
}

fn server_error() -> ApiError {
    ApiError::Http {
        status: 500,
        body: "internal error".to_string(),
    }
}

/// Source helpdesk serving fixed headers and threads.
#[derive(Default)]
pub struct FakeSource {
    pub headers: Vec<SourceTicketHeader>,
    pub threads: HashMap<String, Vec<ConversationEntry>>,
    pub fail_listing: bool,
    /// Ticket ids whose thread request fails with a server error.
    pub broken_threads: HashSet<String>,
    /// Ticket ids whose thread request is rejected as unauthorized.
    pub unauthorized_threads: HashSet<String>,
    pub thread_requests: RefCell<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ticket(mut self, header: SourceTicketHeader, entries: Vec<ConversationEntry>) -> Self {
        self.threads.insert(header.ticket_id.clone(), entries);
        self.headers.push(header);
        self
    }
}

impl SourceApi for FakeSource {
    fn list_tickets(&self) -> ApiResult<Vec<SourceTicketHeader>> {
        if self.fail_listing {
            return Err(server_error());
        }
        Ok(self.headers.clone())
    }

    fn list_conversations(&self, ticket_id: &str) -> ApiResult<Vec<ConversationEntry>> {
        self.thread_requests.borrow_mut().push(ticket_id.to_string());
        if self.unauthorized_threads.contains(ticket_id) {
            return Err(unauthorized("SuperOps"));
        }
        if self.broken_threads.contains(ticket_id) {
            return Err(server_error());
        }
        Ok(self.threads.get(ticket_id).cloned().unwrap_or_default())
    }
}

/// Destination helpdesk that records every write.
#[derive(Default)]
pub struct FakeDestination {
    pub reference: RefCell<HashMap<EntityKind, Vec<ReferenceEntity>>>,
    /// Tickets that exist before the run.
    pub existing: RefCell<Vec<TicketSummary>>,
    pub tickets: RefCell<Vec<(String, NewTicket)>>,
    pub comments: RefCell<Vec<(String, NewComment)>>,
    pub created_entities: RefCell<Vec<(EntityKind, NewEntity)>>,
    pub reference_calls: Cell<usize>,
    pub subject_calls: Cell<usize>,
    /// Listing this kind fails with a server error.
    pub failing_kind: Cell<Option<EntityKind>>,
    /// Every call is rejected as unauthorized.
    pub reject_credentials: Cell<bool>,
    /// Comments fail once this many have been accepted.
    pub comment_budget: Cell<Option<usize>>,
    next_id: Cell<u64>,
}

impl FakeDestination {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(500),
            ..Self::default()
        }
    }

    pub fn with_reference(self, kind: EntityKind, entities: Vec<ReferenceEntity>) -> Self {
        self.reference.borrow_mut().insert(kind, entities);
        self
    }

    pub fn with_existing(self, id: &str, subject: &str) -> Self {
        self.existing.borrow_mut().push(TicketSummary {
            id: id.to_string(),
            subject: subject.to_string(),
        });
        self
    }

    pub fn ticket_subjects(&self) -> Vec<String> {
        self.tickets
            .borrow()
            .iter()
            .map(|(_, ticket)| ticket.subject.clone())
            .collect()
    }

    pub fn comments_for(&self, ticket_id: &str) -> Vec<NewComment> {
        self.comments
            .borrow()
            .iter()
            .filter(|(id, _)| id == ticket_id)
            .map(|(_, comment)| comment.clone())
            .collect()
    }

    fn allocate_id(&self) -> String {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id.to_string()
    }

    fn check_credentials(&self) -> ApiResult<()> {
        if self.reject_credentials.get() {
            return Err(unauthorized("Syncro"));
        }
        Ok(())
    }
}

impl DestinationApi for FakeDestination {
    fn list_reference_entities(&self, kind: EntityKind) -> ApiResult<Vec<ReferenceEntity>> {
        self.check_credentials()?;
        self.reference_calls.set(self.reference_calls.get() + 1);
        if self.failing_kind.get() == Some(kind) {
            return Err(server_error());
        }
        Ok(self.reference.borrow().get(&kind).cloned().unwrap_or_default())
    }

    fn list_ticket_subjects(&self) -> ApiResult<Vec<TicketSummary>> {
        self.check_credentials()?;
        self.subject_calls.set(self.subject_calls.get() + 1);
        let mut subjects = self.existing.borrow().clone();
        subjects.extend(self.tickets.borrow().iter().map(|(id, ticket)| TicketSummary {
            id: id.clone(),
            subject: ticket.subject.clone(),
        }));
        Ok(subjects)
    }

    fn create_ticket(&self, ticket: &NewTicket) -> ApiResult<CreatedTicket> {
        self.check_credentials()?;
        let id = self.allocate_id();
        self.tickets.borrow_mut().push((id.clone(), ticket.clone()));
        Ok(CreatedTicket { id, number: None })
    }

    fn create_comment(&self, ticket_id: &str, comment: &NewComment) -> ApiResult<()> {
        self.check_credentials()?;
        if let Some(budget) = self.comment_budget.get() {
            if budget == 0 {
                return Err(server_error());
            }
            self.comment_budget.set(Some(budget - 1));
        }
        self.comments
            .borrow_mut()
            .push((ticket_id.to_string(), comment.clone()));
        Ok(())
    }

    fn create_entity(&self, kind: EntityKind, fields: &NewEntity) -> ApiResult<ReferenceEntity> {
        self.check_credentials()?;
        if !kind.is_person() {
            return Err(ApiError::Unsupported(format!("create {kind}")));
        }
        let entity = ReferenceEntity {
            id: self.allocate_id(),
            name: fields.name.clone(),
            email: fields.email.clone(),
        };
        self.created_entities
            .borrow_mut()
            .push((kind, fields.clone()));
        self.reference
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push(entity.clone());
        Ok(entity)
    }
}
