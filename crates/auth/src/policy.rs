//! Owner exception policy.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::permissions::{Action, Permission, Resource};

/// Which actions a user may perform on resources they own without holding
/// the general permission.
///
/// Serialized as `{ "article": ["UPDATE", "DELETE"] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerPolicy {
    exceptions: BTreeMap<Resource, BTreeSet<Action>>,
}

impl OwnerPolicy {
    /// No owner exceptions at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Authors may edit and delete their own articles.
    pub fn journal_default() -> Self {
        Self::none()
            .allow(Resource::Article, Action::Update)
            .allow(Resource::Article, Action::Delete)
    }

    pub fn allow(mut self, resource: Resource, action: Action) -> Self {
        self.exceptions.entry(resource).or_default().insert(action);
        self
    }

    pub fn permits(&self, permission: &Permission) -> bool {
        self.exceptions
            .get(&permission.resource())
            .is_some_and(|actions| actions.contains(&permission.action()))
    }

    pub fn is_empty(&self) -> bool {
        self.exceptions.values().all(BTreeSet::is_empty)
    }
}
