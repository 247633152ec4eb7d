//! Role and user administration.
//!
//! The directory owns the role and user stores, enforces the invariants that
//! span more than one aggregate (unique role names, last system-role holder,
//! at least one admin role) and is the single place where stored accounts are
//! hydrated into [`User`]s for permission checks. Acting users are hydrated
//! again on every administrative call; the snapshot passed in only names them.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use journal_auth::{
    AccessDecision, AuthorizationExplanation, AuthzError, CreateRole, CreateUser, DeleteRole,
    DeleteUser, GrantPermissions, OwnershipContext, Permission, PermissionChecker, PermissionSet,
    ReassignRole, RevokePermissions, Role, RoleCommand, RoleGrant, UpdateRole, User, UserAccount,
    UserCommand, authorize_any, ensure_can_delegate,
};
use journal_core::{Aggregate, DomainError, DomainEvent, ExpectedVersion, RoleId, UserId};

use crate::config::{AccessConfig, RoleSeed};
use crate::store::{InMemoryStore, Store};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("role not found: {0}")]
    RoleNotFound(RoleId),

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("a role named '{0}' already exists")]
    DuplicateRoleName(String),

    #[error("a user with email '{0}' already exists")]
    DuplicateEmail(String),

    #[error("user {user} is the last holder of system role '{role}'")]
    LastSystemRoleHolder { user: UserId, role: String },

    #[error("no system role holds SYSTEM.ADMIN")]
    NoAdminRole,

    #[error("directory already has users")]
    AlreadyBootstrapped,

    #[error("invalid seed: {0}")]
    InvalidSeed(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    pub permissions: PermissionSet,
}

/// Partial role update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<PermissionSet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub role_id: RoleId,
    pub permissions: PermissionSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleSummary {
    pub role: Role,
    pub user_count: usize,
}

/// One applied event, as kept in the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub event_type: &'static str,
    /// `None` for bootstrap/seed operations.
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

pub type InMemoryDirectory = Directory<InMemoryStore<RoleId, Role>, InMemoryStore<UserId, UserAccount>>;

pub struct Directory<R, U> {
    roles: R,
    users: U,
    checker: PermissionChecker,
    write_lock: Mutex<()>,
    audit: RwLock<Vec<AuditRecord>>,
}

impl InMemoryDirectory {
    /// In-memory directory seeded from `config`.
    pub fn in_memory(config: &AccessConfig) -> DirectoryResult<Self> {
        Self::from_config(config, InMemoryStore::new(), InMemoryStore::new())
    }
}

impl<R, U> Directory<R, U>
where
    R: Store<RoleId, Role>,
    U: Store<UserId, UserAccount>,
{
    pub fn new(roles: R, users: U, checker: PermissionChecker) -> Self {
        Self {
            roles,
            users,
            checker,
            write_lock: Mutex::new(()),
            audit: RwLock::new(Vec::new()),
        }
    }

    /// Build a directory over the given stores and seed the configured roles.
    pub fn from_config(config: &AccessConfig, roles: R, users: U) -> DirectoryResult<Self> {
        config
            .validate()
            .map_err(|e| DirectoryError::InvalidSeed(e.to_string()))?;
        let directory = Self::new(roles, users, PermissionChecker::new(config.owner_exceptions.clone()));
        directory.seed_roles(&config.roles)?;
        Ok(directory)
    }

    pub fn checker(&self) -> &PermissionChecker {
        &self.checker
    }

    pub fn audit_log(&self) -> Vec<AuditRecord> {
        match self.audit.read() {
            Ok(log) => log.clone(),
            Err(_) => vec![],
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bootstrap
    // ─────────────────────────────────────────────────────────────────────────

    /// Create roles that do not exist yet (matched by name). Returns the ones created.
    pub fn seed_roles(&self, seeds: &[RoleSeed]) -> DirectoryResult<Vec<Role>> {
        let _guard = self.lock();
        let mut created = Vec::new();
        for seed in seeds {
            if self.find_role_by_name(&seed.name).is_some() {
                tracing::debug!(role = %seed.name, "seed role already present");
                continue;
            }
            let permissions = seed
                .permission_set()
                .map_err(|e| DirectoryError::InvalidSeed(e.to_string()))?;
            let role_id = RoleId::new();
            let mut role = Role::empty(role_id);
            self.execute(
                &mut role,
                RoleCommand::Create(CreateRole {
                    role_id,
                    name: seed.name.clone(),
                    description: seed.description.clone(),
                    permissions,
                    is_system: seed.is_system,
                    occurred_at: Utc::now(),
                }),
                None,
            )?;
            self.roles.upsert(role_id, role.clone());
            created.push(role);
        }
        Ok(created)
    }

    /// Create the first administrator. Only allowed while the directory has no users.
    pub fn bootstrap_admin(&self, email: &str, display_name: &str) -> DirectoryResult<User> {
        let _guard = self.lock();
        if self.live_users().next().is_some() {
            return Err(DirectoryError::AlreadyBootstrapped);
        }

        let mut admin_roles: Vec<Role> = self
            .live_roles()
            .filter(|r| r.is_system && r.permissions.has_system_admin())
            .collect();
        admin_roles.sort_by(|a, b| a.name.cmp(&b.name));
        let role = admin_roles.into_iter().next().ok_or(DirectoryError::NoAdminRole)?;

        let account = self.insert_user(
            NewUser {
                email: email.to_string(),
                display_name: display_name.to_string(),
                role_id: role.id,
                permissions: PermissionSet::new(),
            },
            None,
        )?;
        tracing::info!(user_id = %account.id, role = %role.name, "bootstrapped administrator");
        self.hydrate(&account)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hydration and checks
    // ─────────────────────────────────────────────────────────────────────────

    /// Hydrate a stored account into a [`User`] ready for permission checks.
    pub fn load_user(&self, user_id: UserId) -> DirectoryResult<User> {
        let account = self.live_user(user_id)?;
        self.hydrate(&account)
    }

    /// Check by id; unknown users are treated as unauthenticated.
    pub fn check(
        &self,
        user_id: Option<UserId>,
        capability: &str,
        context: Option<&OwnershipContext>,
    ) -> AccessDecision {
        let user = user_id.and_then(|id| self.load_user(id).ok());
        self.checker.check(user.as_ref(), capability, context)
    }

    pub fn explain(
        &self,
        user: Option<&User>,
        capability: &str,
        context: Option<&OwnershipContext>,
    ) -> AuthorizationExplanation {
        let mut known: Vec<RoleGrant> = self.live_roles().map(|r| r.grant()).collect();
        known.sort_by(|a, b| a.name.cmp(&b.name));
        self.checker.explain(user, capability, context, &known)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get_role(&self, role_id: RoleId) -> DirectoryResult<Role> {
        self.live_role(role_id)
    }

    /// Case-insensitive lookup among live roles.
    pub fn find_role_by_name(&self, name: &str) -> Option<Role> {
        let needle = name.trim().to_lowercase();
        self.live_roles().find(|r| r.name.to_lowercase() == needle)
    }

    pub fn list_roles(&self, actor: &User) -> DirectoryResult<Vec<RoleSummary>> {
        let actor = &self.current_actor(actor)?;
        self.require(actor, &[Permission::ROLE_MANAGEMENT, Permission::ROLE_READ])?;

        let users: Vec<UserAccount> = self.live_users().collect();
        let mut summaries: Vec<RoleSummary> = self
            .live_roles()
            .map(|role| RoleSummary {
                user_count: users.iter().filter(|u| u.role_id == role.id).count(),
                role,
            })
            .collect();
        summaries.sort_by(|a, b| a.role.name.cmp(&b.role.name));
        Ok(summaries)
    }

    pub fn create_role(&self, actor: &User, new_role: NewRole) -> DirectoryResult<Role> {
        let _guard = self.lock();
        let actor = &self.current_actor(actor)?;
        self.require(actor, &[Permission::ROLE_MANAGEMENT, Permission::ROLE_CREATE])?;
        ensure_can_delegate(actor, &new_role.permissions)?;
        self.ensure_unique_name(&new_role.name, None)?;

        let role_id = RoleId::new();
        let mut role = Role::empty(role_id);
        self.execute(
            &mut role,
            RoleCommand::Create(CreateRole {
                role_id,
                name: new_role.name,
                description: new_role.description,
                permissions: new_role.permissions,
                is_system: false,
                occurred_at: Utc::now(),
            }),
            Some(actor.id),
        )?;
        self.roles.upsert(role_id, role.clone());
        Ok(role)
    }

    pub fn update_role(
        &self,
        actor: &User,
        role_id: RoleId,
        expected: ExpectedVersion,
        changes: RoleChanges,
    ) -> DirectoryResult<Role> {
        let _guard = self.lock();
        let actor = &self.current_actor(actor)?;
        self.require(actor, &[Permission::ROLE_MANAGEMENT, Permission::ROLE_UPDATE])?;

        let mut role = self.live_role(role_id)?;
        expected.check(role.version)?;

        if let Some(name) = &changes.name {
            self.ensure_unique_name(name, Some(role_id))?;
        }
        if let Some(permissions) = &changes.permissions {
            ensure_can_delegate(actor, &permissions.difference(&role.permissions))?;
            if role.permissions.has_system_admin() && !permissions.has_system_admin() {
                self.ensure_other_admin_role(role_id)?;
            }
        }

        self.execute(
            &mut role,
            RoleCommand::Update(UpdateRole {
                role_id,
                name: changes.name,
                description: changes.description,
                permissions: changes.permissions,
                occurred_at: Utc::now(),
            }),
            Some(actor.id),
        )?;
        self.roles.upsert(role_id, role.clone());
        Ok(role)
    }

    /// Delete a role.
    ///
    /// Holders of a non-system role are moved to `reassign_to` first when it
    /// is given; system roles are never deleted while anyone holds them.
    pub fn delete_role(
        &self,
        actor: &User,
        role_id: RoleId,
        reassign_to: Option<RoleId>,
    ) -> DirectoryResult<()> {
        let _guard = self.lock();
        let actor = &self.current_actor(actor)?;
        self.require(actor, &[Permission::ROLE_MANAGEMENT, Permission::ROLE_DELETE])?;

        let mut role = self.live_role(role_id)?;
        if role.permissions.has_system_admin() {
            self.ensure_other_admin_role(role_id)?;
        }

        let holders = self.users_with_role(role_id);
        if !role.is_system && !holders.is_empty() {
            if let Some(target_id) = reassign_to {
                if target_id == role_id {
                    return Err(DomainError::validation("cannot reassign users to the role being deleted").into());
                }
                let target = self.live_role(target_id)?;
                ensure_can_delegate(actor, &target.permissions)?;
                for mut account in holders {
                    let user_id = account.id;
                    self.execute(
                        &mut account,
                        UserCommand::ReassignRole(ReassignRole {
                            user_id,
                            role_id: target_id,
                            occurred_at: Utc::now(),
                        }),
                        Some(actor.id),
                    )?;
                    self.users.upsert(user_id, account);
                }
            }
        }

        let assigned_users = self.users_with_role(role_id).len();
        let outcome = self.execute(
            &mut role,
            RoleCommand::Delete(DeleteRole {
                role_id,
                assigned_users,
                occurred_at: Utc::now(),
            }),
            Some(actor.id),
        );
        if let Err(err) = &outcome {
            tracing::warn!(role = %role.name, error = %err, "role deletion refused");
        }
        outcome?;

        self.roles.remove(&role_id);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get_user(&self, user_id: UserId) -> DirectoryResult<UserAccount> {
        self.live_user(user_id)
    }

    pub fn users_with_role(&self, role_id: RoleId) -> Vec<UserAccount> {
        let mut users: Vec<UserAccount> = self.live_users().filter(|u| u.role_id == role_id).collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users
    }

    pub fn create_user(&self, actor: &User, new_user: NewUser) -> DirectoryResult<User> {
        let _guard = self.lock();
        let actor = &self.current_actor(actor)?;
        self.require(actor, &[Permission::USER_CREATE])?;

        let role = self.live_role(new_user.role_id)?;
        ensure_can_delegate(actor, &role.permissions.union(&new_user.permissions))?;

        let account = self.insert_user(new_user, Some(actor.id))?;
        self.hydrate(&account)
    }

    pub fn reassign_role(&self, actor: &User, user_id: UserId, role_id: RoleId) -> DirectoryResult<User> {
        let _guard = self.lock();
        let actor = &self.current_actor(actor)?;
        self.require(actor, &[Permission::USER_UPDATE])?;

        let mut account = self.live_user(user_id)?;
        let target = self.live_role(role_id)?;
        ensure_can_delegate(actor, &target.permissions)?;
        if account.role_id != role_id {
            self.ensure_not_last_holder(&account)?;
        }

        self.execute(
            &mut account,
            UserCommand::ReassignRole(ReassignRole {
                user_id,
                role_id,
                occurred_at: Utc::now(),
            }),
            Some(actor.id),
        )?;
        self.users.upsert(user_id, account.clone());
        self.hydrate(&account)
    }

    pub fn grant_permissions(
        &self,
        actor: &User,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> DirectoryResult<User> {
        let _guard = self.lock();
        let actor = &self.current_actor(actor)?;
        self.require(actor, &[Permission::USER_UPDATE])?;
        ensure_can_delegate(actor, &permissions)?;

        let mut account = self.live_user(user_id)?;
        self.execute(
            &mut account,
            UserCommand::GrantPermissions(GrantPermissions {
                user_id,
                permissions,
                occurred_at: Utc::now(),
            }),
            Some(actor.id),
        )?;
        self.users.upsert(user_id, account.clone());
        self.hydrate(&account)
    }

    pub fn revoke_permissions(
        &self,
        actor: &User,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> DirectoryResult<User> {
        let _guard = self.lock();
        let actor = &self.current_actor(actor)?;
        self.require(actor, &[Permission::USER_UPDATE])?;

        let mut account = self.live_user(user_id)?;
        self.execute(
            &mut account,
            UserCommand::RevokePermissions(RevokePermissions {
                user_id,
                permissions,
                occurred_at: Utc::now(),
            }),
            Some(actor.id),
        )?;
        self.users.upsert(user_id, account.clone());
        self.hydrate(&account)
    }

    pub fn delete_user(&self, actor: &User, user_id: UserId) -> DirectoryResult<()> {
        let _guard = self.lock();
        let actor = &self.current_actor(actor)?;
        self.require(actor, &[Permission::USER_DELETE])?;

        let mut account = self.live_user(user_id)?;
        self.ensure_not_last_holder(&account)?;

        self.execute(
            &mut account,
            UserCommand::Delete(DeleteUser {
                user_id,
                occurred_at: Utc::now(),
            }),
            Some(actor.id),
        )?;
        self.users.remove(&user_id);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-hydrate the acting user so gates see their current role and grants.
    fn current_actor(&self, actor: &User) -> DirectoryResult<User> {
        self.load_user(actor.id).map_err(|err| match err {
            DirectoryError::UserNotFound(_) => {
                tracing::warn!(actor = %actor.id, "administrative action by unknown actor");
                DirectoryError::Forbidden(AuthzError::NotAuthenticated)
            }
            other => other,
        })
    }

    fn require(&self, actor: &User, alternatives: &[Permission]) -> DirectoryResult<()> {
        authorize_any(actor, alternatives).map_err(|err| {
            tracing::warn!(actor = %actor.id, error = %err, "administrative action refused");
            DirectoryError::from(err)
        })
    }

    /// Run a command against an aggregate, applying and auditing its events.
    fn execute<A>(&self, aggregate: &mut A, command: A::Command, actor: Option<UserId>) -> DirectoryResult<()>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Serialize,
    {
        let events = aggregate.handle(&command)?;
        for event in &events {
            aggregate.apply(event);
            self.record(actor, event);
        }
        Ok(())
    }

    fn record<E>(&self, actor: Option<UserId>, event: &E)
    where
        E: DomainEvent + Serialize,
    {
        let payload = serde_json::to_value(event).unwrap_or_else(|err| {
            tracing::warn!(event_type = event.event_type(), error = %err, "event payload not serializable");
            serde_json::Value::Null
        });
        tracing::info!(
            event_type = event.event_type(),
            actor = ?actor,
            "directory event applied"
        );
        if let Ok(mut log) = self.audit.write() {
            log.push(AuditRecord {
                event_type: event.event_type(),
                actor,
                occurred_at: event.occurred_at(),
                payload,
            });
        }
    }

    fn insert_user(&self, new_user: NewUser, actor: Option<UserId>) -> DirectoryResult<UserAccount> {
        let email = new_user.email.trim().to_lowercase();
        if self.live_users().any(|u| u.email == email) {
            return Err(DirectoryError::DuplicateEmail(email));
        }

        let user_id = UserId::new();
        let mut account = UserAccount::empty(user_id);
        self.execute(
            &mut account,
            UserCommand::Create(CreateUser {
                user_id,
                email: new_user.email,
                display_name: new_user.display_name,
                role_id: new_user.role_id,
                permissions: new_user.permissions,
                occurred_at: Utc::now(),
            }),
            actor,
        )?;
        self.users.upsert(user_id, account.clone());
        Ok(account)
    }

    fn hydrate(&self, account: &UserAccount) -> DirectoryResult<User> {
        let role = self.live_role(account.role_id)?;
        Ok(User {
            id: account.id,
            display_name: account.display_name.clone(),
            role: role.grant(),
            permissions: account.permissions.clone(),
        })
    }

    fn live_roles(&self) -> impl Iterator<Item = Role> {
        self.roles.list().into_iter().filter(Role::is_live)
    }

    fn live_users(&self) -> impl Iterator<Item = UserAccount> {
        self.users.list().into_iter().filter(UserAccount::is_live)
    }

    fn live_role(&self, role_id: RoleId) -> DirectoryResult<Role> {
        self.roles
            .get(&role_id)
            .filter(Role::is_live)
            .ok_or(DirectoryError::RoleNotFound(role_id))
    }

    fn live_user(&self, user_id: UserId) -> DirectoryResult<UserAccount> {
        self.users
            .get(&user_id)
            .filter(UserAccount::is_live)
            .ok_or(DirectoryError::UserNotFound(user_id))
    }

    fn ensure_unique_name(&self, name: &str, except: Option<RoleId>) -> DirectoryResult<()> {
        match self.find_role_by_name(name) {
            Some(existing) if Some(existing.id) != except => {
                Err(DirectoryError::DuplicateRoleName(existing.name))
            }
            _ => Ok(()),
        }
    }

    fn ensure_not_last_holder(&self, account: &UserAccount) -> DirectoryResult<()> {
        let role = self.live_role(account.role_id)?;
        if role.is_system && self.users_with_role(role.id).len() <= 1 {
            tracing::warn!(user_id = %account.id, role = %role.name, "last system role holder protected");
            return Err(DirectoryError::LastSystemRoleHolder {
                user: account.id,
                role: role.name,
            });
        }
        Ok(())
    }

    /// At least one other live role must keep `SYSTEM.ADMIN`.
    fn ensure_other_admin_role(&self, role_id: RoleId) -> DirectoryResult<()> {
        let others = self
            .live_roles()
            .any(|r| r.id != role_id && r.permissions.has_system_admin());
        if others {
            Ok(())
        } else {
            Err(DomainError::invariant("at least one role must keep SYSTEM.ADMIN").into())
        }
    }
}
