//! Identity resolution: source names/e-mails to destination ids.
//!
//! Resolution order for one entity:
//! 1. Explicit mapping (`status-map` / `type-map`) for statuses and issue types
//! 2. Reference snapshot lookup (e-mail first, then name)
//! 3. The kind's [`MissingPolicy`]
//!
//! The resolver never owns the snapshot. Callers pass the run's
//! [`ReferenceSnapshot`] by `&mut`, so entities created here become visible to
//! later tickets of the same run without touching the file on disk.

use crate::api::{ApiError, DestinationApi};
use crate::cache::ReferenceSnapshot;
use crate::error::{FerryError, Result};
use crate::model::{EntityKind, NewEntity, SourcePerson};
use crate::util::normalize_key;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// What to do when an entity has no match in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Create it on the destination (people only).
    Create,
    /// Use another value, itself resolved through the snapshot.
    Default(String),
    /// Leave the field unset.
    Skip,
    /// Fail the ticket.
    Fail,
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Default(value) => write!(f, "default:{value}"),
            Self::Skip => f.write_str("skip"),
            Self::Fail => f.write_str("fail"),
        }
    }
}

impl FromStr for MissingPolicy {
    type Err = String;

    fn from_str(input: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = input.trim();
        if let Some(value) = trimmed.strip_prefix("default:") {
            let value = value.trim();
            if value.is_empty() {
                return Err("default policy needs a value, e.g. default:Resolved".to_string());
            }
            return Ok(Self::Default(value.to_string()));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "skip" | "unassigned" | "none" => Ok(Self::Skip),
            "fail" | "error" => Ok(Self::Fail),
            other => Err(format!(
                "Invalid missing policy: {other}. Must be one of: create, skip, fail, default:<value>"
            )),
        }
    }
}

/// Per-kind fallbacks plus explicit value maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvePolicy {
    pub customer: MissingPolicy,
    pub contact: MissingPolicy,
    pub technician: MissingPolicy,
    pub status: MissingPolicy,
    pub issue_type: MissingPolicy,
    /// Normalized source status -> destination status.
    pub status_map: HashMap<String, String>,
    /// Normalized source issue type -> destination issue type.
    pub type_map: HashMap<String, String>,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            customer: MissingPolicy::Fail,
            contact: MissingPolicy::Create,
            technician: MissingPolicy::Skip,
            status: MissingPolicy::Default("Resolved".to_string()),
            issue_type: MissingPolicy::Default("Other".to_string()),
            status_map: HashMap::new(),
            type_map: HashMap::new(),
        }
    }
}

impl ResolvePolicy {
    #[must_use]
    pub const fn for_kind(&self, kind: EntityKind) -> &MissingPolicy {
        match kind {
            EntityKind::Customer => &self.customer,
            EntityKind::Contact => &self.contact,
            EntityKind::Technician => &self.technician,
            EntityKind::Status => &self.status,
            EntityKind::IssueType => &self.issue_type,
        }
    }

    fn mapped(&self, kind: EntityKind, value: &str) -> Option<&str> {
        let map = match kind {
            EntityKind::Status => &self.status_map,
            EntityKind::IssueType => &self.type_map,
            _ => return None,
        };
        map.get(&normalize_key(value)).map(String::as_str)
    }

    /// Reject policies the destination cannot honor.
    ///
    /// # Errors
    ///
    /// Returns a config error if `create` is set for a status or issue type.
    pub fn validate(&self) -> Result<()> {
        for kind in [EntityKind::Status, EntityKind::IssueType] {
            if *self.for_kind(kind) == MissingPolicy::Create {
                return Err(FerryError::config(format!(
                    "missing.{kind} cannot be 'create'; use default:<value>, skip or fail"
                )));
            }
        }
        Ok(())
    }
}

/// Source-side identity to resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceEntity {
    pub name: String,
    pub email: Option<String>,
    /// Owning destination customer, required to create contacts.
    pub customer_id: Option<String>,
}

impl SourceEntity {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_person(person: &SourcePerson) -> Self {
        Self {
            name: person.name.clone(),
            email: person.email.clone(),
            customer_id: None,
        }
    }

    #[must_use]
    pub fn with_customer(mut self, customer_id: &str) -> Self {
        self.customer_id = Some(customer_id.to_string());
        self
    }

    /// Display key for logs and errors.
    #[must_use]
    pub fn key(&self) -> &str {
        match self.email.as_deref() {
            Some(email) if !email.trim().is_empty() => email,
            _ => &self.name,
        }
    }

    fn is_blank(&self) -> bool {
        self.name.trim().is_empty() && self.email.as_deref().is_none_or(|e| e.trim().is_empty())
    }
}

/// Resolves source identities against the run's reference snapshot.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    policy: ResolvePolicy,
}

impl IdentityResolver {
    #[must_use]
    pub const fn new(policy: ResolvePolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &ResolvePolicy {
        &self.policy
    }

    /// Resolve one entity to a destination id. `Ok(None)` means "leave unset".
    ///
    /// # Errors
    ///
    /// Returns `Resolution` when the entity cannot be matched or created, and
    /// `Auth` if the destination rejects credentials while creating it.
    pub fn resolve(
        &self,
        snapshot: &mut ReferenceSnapshot,
        kind: EntityKind,
        entity: &SourceEntity,
        destination: &dyn DestinationApi,
    ) -> Result<Option<String>> {
        if let Some(mapped) = self.policy.mapped(kind, &entity.name) {
            let id = snapshot.lookup(kind, mapped).unwrap_or(mapped).to_string();
            debug!(%kind, key = entity.key(), id = %id, "Resolved via explicit map");
            return Ok(Some(id));
        }

        if let Some(id) = lookup(snapshot, kind, entity) {
            return Ok(Some(id));
        }

        match self.policy.for_kind(kind) {
            MissingPolicy::Create => self.create(snapshot, kind, entity, destination).map(Some),
            MissingPolicy::Default(value) => {
                if let Some(id) = snapshot.lookup(kind, value) {
                    return Ok(Some(id.to_string()));
                }
                if kind.is_person() {
                    return Err(FerryError::resolution(
                        kind,
                        entity.key(),
                        format!("default '{value}' is not in the reference snapshot"),
                    ));
                }
                Ok(Some(value.clone()))
            }
            MissingPolicy::Skip => {
                debug!(%kind, key = entity.key(), "No match, leaving unset");
                Ok(None)
            }
            MissingPolicy::Fail => Err(FerryError::resolution(
                kind,
                entity.key(),
                "no match in reference snapshot",
            )),
        }
    }

    #[allow(clippy::unused_self)]
    fn create(
        &self,
        snapshot: &mut ReferenceSnapshot,
        kind: EntityKind,
        entity: &SourceEntity,
        destination: &dyn DestinationApi,
    ) -> Result<String> {
        if !kind.is_person() {
            return Err(FerryError::resolution(
                kind,
                entity.key(),
                "only people can be created on the destination",
            ));
        }
        if entity.is_blank() {
            return Err(FerryError::resolution(kind, "", "source has no name or e-mail"));
        }
        if kind == EntityKind::Contact && entity.customer_id.is_none() {
            return Err(FerryError::resolution(
                kind,
                entity.key(),
                "contact has no resolved customer",
            ));
        }

        let name = if entity.name.trim().is_empty() {
            entity.key().to_string()
        } else {
            entity.name.trim().to_string()
        };
        let fields = NewEntity {
            name,
            email: entity.email.clone(),
            customer_id: entity.customer_id.clone(),
        };

        let created = destination
            .create_entity(kind, &fields)
            .map_err(|source| match source {
                ApiError::Unauthorized { system, detail } => FerryError::Auth { system, detail },
                other => FerryError::resolution(kind, entity.key(), format!("create failed: {other}")),
            })?;

        snapshot.add_entity(kind, &created);
        // Source spelling may differ from what the destination echoes back.
        snapshot.insert(kind, &entity.name, &created.id);
        info!(%kind, key = entity.key(), id = %created.id, "Created missing entity on destination");
        Ok(created.id)
    }
}

fn lookup(snapshot: &ReferenceSnapshot, kind: EntityKind, entity: &SourceEntity) -> Option<String> {
    entity
        .email
        .as_deref()
        .and_then(|email| snapshot.lookup(kind, email))
        .or_else(|| snapshot.lookup(kind, &entity.name))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policies() {
        assert_eq!("create".parse::<MissingPolicy>().unwrap(), MissingPolicy::Create);
        assert_eq!("Unassigned".parse::<MissingPolicy>().unwrap(), MissingPolicy::Skip);
        assert_eq!(
            "default: Resolved".parse::<MissingPolicy>().unwrap(),
            MissingPolicy::Default("Resolved".to_string())
        );
        assert!("default:".parse::<MissingPolicy>().is_err());
        assert!("maybe".parse::<MissingPolicy>().is_err());
    }

    #[test]
    fn policy_display_round_trips() {
        for policy in [
            MissingPolicy::Create,
            MissingPolicy::Skip,
            MissingPolicy::Fail,
            MissingPolicy::Default("Other".to_string()),
        ] {
            assert_eq!(policy.to_string().parse::<MissingPolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn create_for_status_is_rejected() {
        let policy = ResolvePolicy {
            status: MissingPolicy::Create,
            ..ResolvePolicy::default()
        };
        assert!(policy.validate().is_err());
        assert!(ResolvePolicy::default().validate().is_ok());
    }

    #[test]
    fn entity_key_prefers_email() {
        let entity = SourceEntity {
            name: "Carl".to_string(),
            email: Some("carl@acme.test".to_string()),
            customer_id: None,
        };
        assert_eq!(entity.key(), "carl@acme.test");
        assert_eq!(SourceEntity::named("Carl").key(), "Carl");
    }
}
