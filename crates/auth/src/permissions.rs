//! Typed permission model.
//!
//! A permission is a `resource.ACTION` pair drawn from a closed catalogue.
//! Strings only exist at the edges (config, stored records, capability
//! queries); everything past [`Permission::from_str`] works on the enums.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resource half of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resource {
    #[serde(rename = "article")]
    Article,
    #[serde(rename = "author")]
    Author,
    #[serde(rename = "callforpapers")]
    CallForPapers,
    #[serde(rename = "journalissue")]
    JournalIssue,
    #[serde(rename = "editorialboardmember")]
    EditorialBoardMember,
    #[serde(rename = "media")]
    Media,
    #[serde(rename = "notification")]
    Notification,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "role")]
    Role,
    #[serde(rename = "SYSTEM")]
    System,
}

impl Resource {
    /// Every resource, in catalogue order.
    pub const ALL: [Resource; 10] = [
        Resource::Article,
        Resource::Author,
        Resource::CallForPapers,
        Resource::JournalIssue,
        Resource::EditorialBoardMember,
        Resource::Media,
        Resource::Notification,
        Resource::User,
        Resource::Role,
        Resource::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Article => "article",
            Resource::Author => "author",
            Resource::CallForPapers => "callforpapers",
            Resource::JournalIssue => "journalissue",
            Resource::EditorialBoardMember => "editorialboardmember",
            Resource::Media => "media",
            Resource::Notification => "notification",
            Resource::User => "user",
            Resource::Role => "role",
            Resource::System => "SYSTEM",
        }
    }

    /// Plural display label used by admin screens.
    pub fn label(&self) -> &'static str {
        match self {
            Resource::Article => "Articles",
            Resource::Author => "Authors",
            Resource::CallForPapers => "Calls for papers",
            Resource::JournalIssue => "Journal issues",
            Resource::EditorialBoardMember => "Editorial board members",
            Resource::Media => "Media",
            Resource::Notification => "Notifications",
            Resource::User => "Users",
            Resource::Role => "Roles",
            Resource::System => "System",
        }
    }

    /// Actions that may be paired with this resource.
    pub fn supported_actions(&self) -> &'static [Action] {
        match self {
            Resource::System => &[Action::Admin, Action::RoleManagement],
            _ => &[
                Action::Create,
                Action::Read,
                Action::Update,
                Action::Delete,
                Action::All,
            ],
        }
    }

    pub fn supports(&self, action: Action) -> bool {
        self.supported_actions().contains(&action)
    }
}

impl core::fmt::Display for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| PermissionParseError::UnknownResource(s.to_string()))
    }
}

/// Action half of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    /// Per-resource wildcard.
    All,
    Admin,
    RoleManagement,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::All,
        Action::Admin,
        Action::RoleManagement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Read => "READ",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
            Action::All => "ALL",
            Action::Admin => "ADMIN",
            Action::RoleManagement => "ROLE_MANAGEMENT",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| PermissionParseError::UnknownAction(s.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionParseError {
    #[error("missing '.' separator in '{0}'")]
    MissingSeparator(String),

    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("action {action} is not supported on resource {resource}")]
    Unsupported { resource: Resource, action: Action },
}

/// A single `resource.ACTION` grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    resource: Resource,
    action: Action,
}

impl Permission {
    /// `SYSTEM.ADMIN`: allows everything.
    pub const SYSTEM_ADMIN: Permission = Permission::known(Resource::System, Action::Admin);

    /// `SYSTEM.ROLE_MANAGEMENT`: administer roles and their permissions.
    pub const ROLE_MANAGEMENT: Permission = Permission::known(Resource::System, Action::RoleManagement);

    pub const ROLE_READ: Permission = Permission::known(Resource::Role, Action::Read);
    pub const ROLE_CREATE: Permission = Permission::known(Resource::Role, Action::Create);
    pub const ROLE_UPDATE: Permission = Permission::known(Resource::Role, Action::Update);
    pub const ROLE_DELETE: Permission = Permission::known(Resource::Role, Action::Delete);
    pub const USER_CREATE: Permission = Permission::known(Resource::User, Action::Create);
    pub const USER_UPDATE: Permission = Permission::known(Resource::User, Action::Update);
    pub const USER_DELETE: Permission = Permission::known(Resource::User, Action::Delete);

    /// Only for pairings that are valid by construction.
    const fn known(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }

    pub fn new(resource: Resource, action: Action) -> Result<Self, PermissionParseError> {
        if !resource.supports(action) {
            return Err(PermissionParseError::Unsupported { resource, action });
        }
        Ok(Self { resource, action })
    }

    /// The `resource.ALL` wildcard, if the resource has one.
    pub fn wildcard(resource: Resource) -> Option<Self> {
        Self::new(resource, Action::All).ok()
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn is_wildcard(&self) -> bool {
        self.action == Action::All
    }

    pub fn is_system_admin(&self) -> bool {
        *self == Self::SYSTEM_ADMIN
    }

    /// Whether holding `self` is enough to exercise `other`.
    pub fn covers(&self, other: &Permission) -> bool {
        self.is_system_admin()
            || self == other
            || (self.is_wildcard() && self.resource == other.resource)
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.resource, self.action)
    }
}

impl FromStr for Permission {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, action) = s
            .split_once('.')
            .ok_or_else(|| PermissionParseError::MissingSeparator(s.to_string()))?;
        Permission::new(resource.parse()?, action.parse()?)
    }
}

impl TryFrom<String> for Permission {
    type Error = PermissionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.to_string()
    }
}

/// Ordered, duplicate-free set of permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of permission strings, failing on the first bad entry.
    pub fn parse_all<I, S>(items: I) -> Result<Self, PermissionParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        items
            .into_iter()
            .map(|s| s.as_ref().parse::<Permission>())
            .collect()
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn remove(&mut self, permission: &Permission) -> bool {
        self.0.remove(permission)
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        Self(self.0.union(&other.0).copied().collect())
    }

    /// Entries of `self` not present in `other`.
    pub fn difference(&self, other: &PermissionSet) -> PermissionSet {
        Self(self.0.difference(&other.0).copied().collect())
    }

    pub fn has_system_admin(&self) -> bool {
        self.contains(&Permission::SYSTEM_ADMIN)
    }

    /// Whether any entry covers `permission` (admin, exact or wildcard).
    pub fn covers(&self, permission: &Permission) -> bool {
        self.0.iter().any(|p| p.covers(permission))
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Permission> for PermissionSet {
    fn extend<T: IntoIterator<Item = Permission>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl<'a> IntoIterator for &'a PermissionSet {
    type Item = &'a Permission;
    type IntoIter = std::collections::btree_set::Iter<'a, Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
