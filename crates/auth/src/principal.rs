//! Hydrated user as seen by the permission checker.
//!
//! The directory produces these at the authentication boundary. The role's
//! permissions travel inline, so checks never need to fetch anything.

use serde::{Deserialize, Deserializer, Serialize};

use journal_core::UserId;

use crate::permissions::{Permission, PermissionSet};

/// The role half of a hydrated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub name: String,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default, deserialize_with = "known_grants")]
    pub permissions: PermissionSet,
}

/// A fully hydrated user: role plus direct grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub display_name: String,
    pub role: RoleGrant,
    /// Grants held outside the role.
    #[serde(default, deserialize_with = "known_grants")]
    pub permissions: PermissionSet,
}

impl User {
    /// Role permissions ∪ direct permissions.
    pub fn effective_permissions(&self) -> PermissionSet {
        self.role.permissions.union(&self.permissions)
    }

    pub fn is_system_admin(&self) -> bool {
        self.role.permissions.has_system_admin() || self.permissions.has_system_admin()
    }
}

/// User records from outside may carry grants that are no longer in the
/// catalogue. Those are dropped so the rest of the record still hydrates.
fn known_grants<'de, D>(deserializer: D) -> Result<PermissionSet, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|grant| match grant.parse::<Permission>() {
            Ok(permission) => Some(permission),
            Err(err) => {
                tracing::warn!(grant = %grant, error = %err, "dropping unknown permission grant");
                None
            }
        })
        .collect())
}

/// Ownership facts for "own resource" checks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipContext {
    pub resource_owner: UserId,
    pub user_id: UserId,
}

impl OwnershipContext {
    pub fn new(resource_owner: UserId, user_id: UserId) -> Self {
        Self {
            resource_owner,
            user_id,
        }
    }

    /// Owner and requester match, and both are `user`.
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.resource_owner == self.user_id && self.user_id == user
    }
}
