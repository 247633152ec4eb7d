//! Permission listing helpers for administration screens.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::permissions::{Action, Permission, PermissionSet, Resource};

/// One catalogue row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionEntry {
    pub permission: Permission,
    pub description: String,
}

/// All permissions of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionGroup {
    pub resource: Resource,
    pub label: &'static str,
    pub permissions: Vec<PermissionEntry>,
}

/// Every valid permission, in catalogue order.
pub fn all_permissions() -> Vec<Permission> {
    Resource::ALL
        .iter()
        .flat_map(|resource| {
            resource
                .supported_actions()
                .iter()
                .filter_map(move |action| Permission::new(*resource, *action).ok())
        })
        .collect()
}

/// The full catalogue grouped by resource.
pub fn catalogue() -> Vec<PermissionGroup> {
    Resource::ALL
        .iter()
        .map(|resource| PermissionGroup {
            resource: *resource,
            label: resource.label(),
            permissions: resource
                .supported_actions()
                .iter()
                .filter_map(|action| Permission::new(*resource, *action).ok())
                .map(|permission| PermissionEntry {
                    permission,
                    description: describe(&permission),
                })
                .collect(),
        })
        .collect()
}

/// Human-readable description of a permission.
pub fn describe(permission: &Permission) -> String {
    let noun = permission.resource().label().to_lowercase();
    match permission.action() {
        Action::Create => format!("Create {noun}"),
        Action::Read => format!("View {noun}"),
        Action::Update => format!("Edit {noun}"),
        Action::Delete => format!("Delete {noun}"),
        Action::All => format!("Full access to {noun}"),
        Action::Admin => "Full system administration".to_string(),
        Action::RoleManagement => "Manage roles and permissions".to_string(),
    }
}

/// Group a set by resource, e.g. for rendering a role's permission matrix.
pub fn group_by_resource(set: &PermissionSet) -> BTreeMap<Resource, Vec<Action>> {
    let mut grouped: BTreeMap<Resource, Vec<Action>> = BTreeMap::new();
    for permission in set {
        grouped
            .entry(permission.resource())
            .or_default()
            .push(permission.action());
    }
    grouped
}
