//! Role aggregate.
//!
//! A role is a named bundle of permissions. System roles keep their name for
//! life and cannot be deleted while anyone still holds them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use journal_core::{Aggregate, AggregateRoot, DomainError, DomainEvent, RoleId};

use crate::permissions::PermissionSet;
use crate::principal::RoleGrant;

pub const MAX_ROLE_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub permissions: PermissionSet,
    pub is_system: bool,
    pub version: u64,
    pub created: bool,
    pub deleted: bool,
}

impl Role {
    pub fn empty(id: RoleId) -> Self {
        Self {
            id,
            name: String::new(),
            description: None,
            permissions: PermissionSet::new(),
            is_system: false,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn is_live(&self) -> bool {
        self.created && !self.deleted
    }

    /// The slice of this role carried by a hydrated user.
    pub fn grant(&self) -> RoleGrant {
        RoleGrant {
            name: self.name.clone(),
            is_system: self.is_system,
            permissions: self.permissions.clone(),
        }
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.is_live() {
            return Err(DomainError::not_found(format!("role {}", self.id)));
        }
        Ok(())
    }
}

impl AggregateRoot for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Trim and validate a role name.
pub fn normalize_role_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("role name cannot be empty"));
    }
    if name.chars().count() > MAX_ROLE_NAME_LEN {
        return Err(DomainError::validation(format!(
            "role name exceeds {MAX_ROLE_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub role_id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub permissions: PermissionSet,
    pub is_system: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRole {
    pub role_id: RoleId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<PermissionSet>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRole {
    pub role_id: RoleId,
    /// Users still holding the role at decision time.
    pub assigned_users: usize,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RoleCommand {
    Create(CreateRole),
    Update(UpdateRole),
    Delete(DeleteRole),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleCreated {
    pub role_id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub permissions: PermissionSet,
    pub is_system: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the full post-update state of the changed fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUpdated {
    pub role_id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub permissions: PermissionSet,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDeleted {
    pub role_id: RoleId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RoleEvent {
    Created(RoleCreated),
    Updated(RoleUpdated),
    Deleted(RoleDeleted),
}

impl DomainEvent for RoleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RoleEvent::Created(_) => "auth.role.created",
            RoleEvent::Updated(_) => "auth.role.updated",
            RoleEvent::Deleted(_) => "auth.role.deleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RoleEvent::Created(e) => e.occurred_at,
            RoleEvent::Updated(e) => e.occurred_at,
            RoleEvent::Deleted(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Role {
    type Command = RoleCommand;
    type Event = RoleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RoleEvent::Created(e) => {
                self.id = e.role_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.permissions = e.permissions.clone();
                self.is_system = e.is_system;
                self.created = true;
            }
            RoleEvent::Updated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.permissions = e.permissions.clone();
            }
            RoleEvent::Deleted(_) => {
                self.deleted = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RoleCommand::Create(cmd) => self.handle_create(cmd),
            RoleCommand::Update(cmd) => self.handle_update(cmd),
            RoleCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Role {
    fn handle_create(&self, cmd: &CreateRole) -> Result<Vec<RoleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("role already exists"));
        }

        Ok(vec![RoleEvent::Created(RoleCreated {
            role_id: cmd.role_id,
            name: normalize_role_name(&cmd.name)?,
            description: clean_description(cmd.description.as_deref()),
            permissions: cmd.permissions.clone(),
            is_system: cmd.is_system,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateRole) -> Result<Vec<RoleEvent>, DomainError> {
        self.ensure_live()?;

        let name = match &cmd.name {
            Some(name) => normalize_role_name(name)?,
            None => self.name.clone(),
        };
        if self.is_system && name != self.name {
            return Err(DomainError::invariant("system role name is immutable"));
        }

        let description = match &cmd.description {
            Some(description) => clean_description(Some(description)),
            None => self.description.clone(),
        };
        let permissions = cmd.permissions.clone().unwrap_or_else(|| self.permissions.clone());

        if name == self.name && description == self.description && permissions == self.permissions {
            return Err(DomainError::validation("update changes nothing"));
        }

        Ok(vec![RoleEvent::Updated(RoleUpdated {
            role_id: self.id,
            name,
            description,
            permissions,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteRole) -> Result<Vec<RoleEvent>, DomainError> {
        self.ensure_live()?;

        if cmd.assigned_users > 0 {
            let kind = if self.is_system { "system role" } else { "role" };
            return Err(DomainError::invariant(format!(
                "{kind} '{}' still has {} assigned user(s)",
                self.name, cmd.assigned_users
            )));
        }

        Ok(vec![RoleEvent::Deleted(RoleDeleted {
            role_id: self.id,
            name: self.name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn clean_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_role(name: &str, is_system: bool, perms: &[&str]) -> Role {
        let id = RoleId::new();
        let mut role = Role::empty(id);
        let cmd = RoleCommand::Create(CreateRole {
            role_id: id,
            name: name.to_string(),
            description: Some("  seeded  ".to_string()),
            permissions: PermissionSet::parse_all(perms).unwrap(),
            is_system,
            occurred_at: now(),
        });
        for event in role.handle(&cmd).unwrap() {
            role.apply(&event);
        }
        role
    }

    fn update(role: &Role, name: Option<&str>, perms: Option<&[&str]>) -> Result<Vec<RoleEvent>, DomainError> {
        role.handle(&RoleCommand::Update(UpdateRole {
            role_id: role.id,
            name: name.map(str::to_string),
            description: None,
            permissions: perms.map(|p| PermissionSet::parse_all(p).unwrap()),
            occurred_at: now(),
        }))
    }

    #[test]
    fn create_role_trims_name_and_description() {
        let role = created_role("  Editor ", false, &["article.ALL"]);
        assert!(role.is_live());
        assert_eq!(role.name, "Editor");
        assert_eq!(role.description.as_deref(), Some("seeded"));
        assert_eq!(role.version, 1);
    }

    #[test]
    fn create_role_rejects_blank_or_long_names() {
        let role = Role::empty(RoleId::new());
        for name in ["   ".to_string(), "x".repeat(MAX_ROLE_NAME_LEN + 1)] {
            let result = role.handle(&RoleCommand::Create(CreateRole {
                role_id: role.id,
                name,
                description: None,
                permissions: PermissionSet::new(),
                is_system: false,
                occurred_at: now(),
            }));
            assert!(matches!(result, Err(DomainError::Validation(_))));
        }
    }

    #[test]
    fn cannot_create_twice() {
        let role = created_role("Author", false, &[]);
        let result = role.handle(&RoleCommand::Create(CreateRole {
            role_id: role.id,
            name: "Author".to_string(),
            description: None,
            permissions: PermissionSet::new(),
            is_system: false,
            occurred_at: now(),
        }));
        assert!(result.is_err());
    }

    #[test]
    fn update_replaces_permissions() {
        let mut role = created_role("Author", false, &["article.CREATE"]);
        let events = update(&role, None, Some(&["article.CREATE", "media.CREATE"][..])).unwrap();
        for event in &events {
            role.apply(event);
        }
        assert_eq!(role.permissions.len(), 2);
        assert_eq!(role.version, 2);
    }

    #[test]
    fn system_role_name_is_immutable() {
        let role = created_role("Super Admin", true, &["SYSTEM.ADMIN"]);
        let err = update(&role, Some("Root"), None).unwrap_err();
        assert!(err.to_string().contains("immutable"));

        // Same name (after trimming) with new permissions is fine.
        assert!(update(&role, Some(" Super Admin "), Some(&["SYSTEM.ADMIN", "article.ALL"][..])).is_ok());
    }

    #[test]
    fn no_op_update_is_rejected() {
        let role = created_role("Reader", false, &["article.READ"]);
        assert!(matches!(
            update(&role, Some("Reader"), Some(&["article.READ"][..])),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn delete_requires_no_assigned_users() {
        let mut role = created_role("Reviewer", false, &[]);
        let blocked = role.handle(&RoleCommand::Delete(DeleteRole {
            role_id: role.id,
            assigned_users: 2,
            occurred_at: now(),
        }));
        assert!(blocked.unwrap_err().to_string().contains("2 assigned"));

        let events = role
            .handle(&RoleCommand::Delete(DeleteRole {
                role_id: role.id,
                assigned_users: 0,
                occurred_at: now(),
            }))
            .unwrap();
        for event in &events {
            role.apply(event);
        }
        assert!(!role.is_live());
        assert!(matches!(update(&role, None, Some(&[][..])), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn event_types_are_namespaced() {
        let role = created_role("Editor", false, &[]);
        let events = update(&role, Some("Senior Editor"), None).unwrap();
        assert_eq!(events[0].event_type(), "auth.role.updated");
        assert_eq!(events[0].version(), 1);
    }
}
