//! User account aggregate.
//!
//! This is the stored form of a user: it references its role by id. The
//! checker never sees it directly; see [`crate::principal::User`] for the
//! hydrated form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use journal_core::{Aggregate, AggregateRoot, DomainError, DomainEvent, RoleId, UserId};

use crate::permissions::PermissionSet;

/// User account.
///
/// # Invariants
/// - Exactly one role at any time.
/// - Email is trimmed, lower-cased and contains '@'.
/// - Deleted accounts accept no further commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub role_id: RoleId,
    /// Grants held outside the role.
    pub permissions: PermissionSet,
    pub version: u64,
    pub created: bool,
    pub deleted: bool,
}

impl UserAccount {
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            email: String::new(),
            display_name: String::new(),
            role_id: RoleId::from_uuid(uuid::Uuid::nil()),
            permissions: PermissionSet::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn is_live(&self) -> bool {
        self.created && !self.deleted
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.is_live() {
            return Err(DomainError::not_found(format!("user {}", self.id)));
        }
        Ok(())
    }
}

impl AggregateRoot for UserAccount {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role_id: RoleId,
    pub permissions: PermissionSet,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignRole {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantPermissions {
    pub user_id: UserId,
    pub permissions: PermissionSet,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokePermissions {
    pub user_id: UserId,
    pub permissions: PermissionSet,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteUser {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    ReassignRole(ReassignRole),
    GrantPermissions(GrantPermissions),
    RevokePermissions(RevokePermissions),
    Delete(DeleteUser),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role_id: RoleId,
    pub permissions: PermissionSet,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleReassigned {
    pub user_id: UserId,
    pub from: RoleId,
    pub to: RoleId,
    pub occurred_at: DateTime<Utc>,
}

/// Only the permissions that were actually added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsGranted {
    pub user_id: UserId,
    pub permissions: PermissionSet,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsRevoked {
    pub user_id: UserId,
    pub permissions: PermissionSet,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDeleted {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    RoleReassigned(RoleReassigned),
    PermissionsGranted(PermissionsGranted),
    PermissionsRevoked(PermissionsRevoked),
    Deleted(UserDeleted),
}

impl DomainEvent for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "auth.user.created",
            UserEvent::RoleReassigned(_) => "auth.user.role_reassigned",
            UserEvent::PermissionsGranted(_) => "auth.user.permissions_granted",
            UserEvent::PermissionsRevoked(_) => "auth.user.permissions_revoked",
            UserEvent::Deleted(_) => "auth.user.deleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::RoleReassigned(e) => e.occurred_at,
            UserEvent::PermissionsGranted(e) => e.occurred_at,
            UserEvent::PermissionsRevoked(e) => e.occurred_at,
            UserEvent::Deleted(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for UserAccount {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => self.apply_created(e),
            UserEvent::RoleReassigned(e) => self.role_id = e.to,
            UserEvent::PermissionsGranted(e) => self.permissions.extend(e.permissions.iter().copied()),
            UserEvent::PermissionsRevoked(e) => {
                for permission in &e.permissions {
                    self.permissions.remove(permission);
                }
            }
            UserEvent::Deleted(_) => self.deleted = true,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::ReassignRole(cmd) => self.handle_reassign(cmd),
            UserCommand::GrantPermissions(cmd) => self.handle_grant(cmd),
            UserCommand::RevokePermissions(cmd) => self.handle_revoke(cmd),
            UserCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl UserAccount {
    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("user already exists"));
        }

        let email = cmd.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }
        if cmd.display_name.trim().is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }

        Ok(vec![UserEvent::Created(UserCreated {
            user_id: cmd.user_id,
            email: email.to_lowercase(),
            display_name: cmd.display_name.trim().to_string(),
            role_id: cmd.role_id,
            permissions: cmd.permissions.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reassign(&self, cmd: &ReassignRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        if self.role_id == cmd.role_id {
            return Err(DomainError::invariant("user already holds this role"));
        }

        Ok(vec![UserEvent::RoleReassigned(RoleReassigned {
            user_id: self.id,
            from: self.role_id,
            to: cmd.role_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_grant(&self, cmd: &GrantPermissions) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        let added = cmd.permissions.difference(&self.permissions);
        if added.is_empty() {
            return Err(DomainError::invariant("permissions already granted"));
        }

        Ok(vec![UserEvent::PermissionsGranted(PermissionsGranted {
            user_id: self.id,
            permissions: added,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke(&self, cmd: &RevokePermissions) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        if cmd.permissions.is_empty() {
            return Err(DomainError::validation("nothing to revoke"));
        }
        if let Some(missing) = cmd.permissions.iter().find(|p| !self.permissions.contains(p)) {
            return Err(DomainError::invariant(format!("permission not granted: {missing}")));
        }

        Ok(vec![UserEvent::PermissionsRevoked(PermissionsRevoked {
            user_id: self.id,
            permissions: cmd.permissions.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        Ok(vec![UserEvent::Deleted(UserDeleted {
            user_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn apply_created(&mut self, e: &UserCreated) {
        self.id = e.user_id;
        self.email = e.email.clone();
        self.display_name = e.display_name.clone();
        self.role_id = e.role_id;
        self.permissions = e.permissions.clone();
        self.created = true;
    }
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

    fn perms(items: &[&str]) -> PermissionSet {
        PermissionSet::parse_all(items).unwrap()
    }

    fn created_user(role_id: RoleId, direct: &[&str]) -> UserAccount {
        let user_id = UserId::new();
        let mut user = UserAccount::empty(user_id);
        let cmd = UserCommand::Create(CreateUser {
            user_id,
            email: " Alice@Example.com ".to_string(),
            display_name: " Alice Smith ".to_string(),
            role_id,
            permissions: perms(direct),
            occurred_at: now(),
        });
        for event in user.handle(&cmd).unwrap() {
            user.apply(&event);
        }
        user
    }

    #[test]
    fn create_user_normalizes_fields() {
        let role_id = RoleId::new();
        let user = created_user(role_id, &["media.READ"]);
        assert!(user.is_live());
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.display_name, "Alice Smith");
        assert_eq!(user.role_id, role_id);
        assert_eq!(user.version, 1);
    }

    #[test]
    fn create_user_invalid_email() {
        let user_id = UserId::new();
        let user = UserAccount::empty(user_id);
        let result = user.handle(&UserCommand::Create(CreateUser {
            user_id,
            email: "invalid-email".to_string(),
            display_name: "Alice".to_string(),
            role_id: RoleId::new(),
            permissions: PermissionSet::new(),
            occurred_at: now(),
        }));
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn reassign_role_records_previous_role() {
        let old_role = RoleId::new();
        let new_role = RoleId::new();
        let mut user = created_user(old_role, &[]);

        let events = user
            .handle(&UserCommand::ReassignRole(ReassignRole {
                user_id: user.id,
                role_id: new_role,
                occurred_at: now(),
            }))
            .unwrap();
        let UserEvent::RoleReassigned(e) = &events[0] else {
            panic!("expected RoleReassigned event");
        };
        assert_eq!(e.from, old_role);
        assert_eq!(e.to, new_role);

        user.apply(&events[0]);
        assert_eq!(user.role_id, new_role);
    }

    #[test]
    fn reassign_to_same_role_is_rejected() {
        let role = RoleId::new();
        let user = created_user(role, &[]);
        let result = user.handle(&UserCommand::ReassignRole(ReassignRole {
            user_id: user.id,
            role_id: role,
            occurred_at: now(),
        }));
        assert!(result.unwrap_err().to_string().contains("already holds"));
    }

    #[test]
    fn grant_emits_only_new_permissions() {
        let mut user = created_user(RoleId::new(), &["media.READ"]);
        let events = user
            .handle(&UserCommand::GrantPermissions(GrantPermissions {
                user_id: user.id,
                permissions: perms(&["media.READ", "article.CREATE"]),
                occurred_at: now(),
            }))
            .unwrap();
        let UserEvent::PermissionsGranted(e) = &events[0] else {
            panic!("expected PermissionsGranted event");
        };
        assert_eq!(e.permissions.to_strings(), vec!["article.CREATE".to_string()]);

        user.apply(&events[0]);
        assert_eq!(user.permissions.len(), 2);

        let again = user.handle(&UserCommand::GrantPermissions(GrantPermissions {
            user_id: user.id,
            permissions: perms(&["article.CREATE"]),
            occurred_at: now(),
        }));
        assert!(again.is_err());
    }

    #[test]
    fn revoke_requires_held_permissions() {
        let mut user = created_user(RoleId::new(), &["media.READ", "media.CREATE"]);
        let missing = user.handle(&UserCommand::RevokePermissions(RevokePermissions {
            user_id: user.id,
            permissions: perms(&["media.DELETE"]),
            occurred_at: now(),
        }));
        assert!(missing.unwrap_err().to_string().contains("media.DELETE"));

        for event in user
            .handle(&UserCommand::RevokePermissions(RevokePermissions {
                user_id: user.id,
                permissions: perms(&["media.CREATE"]),
                occurred_at: now(),
            }))
            .unwrap()
        {
            user.apply(&event);
        }
        assert_eq!(user.permissions.to_strings(), vec!["media.READ".to_string()]);
    }

    #[test]
    fn deleted_user_rejects_commands() {
        let mut user = created_user(RoleId::new(), &[]);
        for event in user
            .handle(&UserCommand::Delete(DeleteUser {
                user_id: user.id,
                occurred_at: now(),
            }))
            .unwrap()
        {
            user.apply(&event);
        }
        assert!(!user.is_live());

        let result = user.handle(&UserCommand::ReassignRole(ReassignRole {
            user_id: user.id,
            role_id: RoleId::new(),
            occurred_at: now(),
        }));
        assert!(matches!(result, Err(DomainError::NotFound(_))));
    }
}
