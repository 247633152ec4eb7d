//! `journal-auth`: permission model and checks for the journal.
//!
//! Pure policy: no HTTP, no storage. Callers hand in a hydrated [`User`] and
//! get a structured [`AccessDecision`] back.

pub mod authorize;
pub mod catalogue;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{
    AccessDecision, AuthorizationExplanation, AuthzError, DecisionBasis, PermissionChecker,
    authorize, authorize_any, check_permission, ensure_can_delegate,
};
pub use catalogue::{
    PermissionEntry, PermissionGroup, all_permissions, catalogue, describe, group_by_resource,
};
pub use permissions::{Action, Permission, PermissionParseError, PermissionSet, Resource};
pub use policy::OwnerPolicy;
pub use principal::{OwnershipContext, RoleGrant, User};
pub use roles::{
    CreateRole, DeleteRole, Role, RoleCommand, RoleCreated, RoleDeleted, RoleEvent, RoleUpdated,
    UpdateRole,
};
pub use user::{
    CreateUser, DeleteUser, GrantPermissions, PermissionsGranted, PermissionsRevoked,
    ReassignRole, RevokePermissions, RoleReassigned, UserAccount, UserCommand, UserCreated,
    UserDeleted, UserEvent,
};
