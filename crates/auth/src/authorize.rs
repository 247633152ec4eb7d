use serde::Serialize;
use thiserror::Error;

use journal_core::UserId;

use crate::permissions::{Permission, PermissionSet};
use crate::policy::OwnerPolicy;
use crate::principal::{OwnershipContext, RoleGrant, User};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("invalid capability: {0}")]
    InvalidCapability(String),

    #[error("insufficient permissions: missing {0}")]
    Forbidden(String),
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBasis {
    SystemAdmin,
    ExactGrant,
    ResourceWildcard,
    OwnResource,
    NotAuthenticated,
    InvalidCapability,
    MissingPermission,
}

/// Outcome of a permission check. `reason` is only set on denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub basis: DecisionBasis,
    #[serde(skip)]
    error: Option<AuthzError>,
}

impl AccessDecision {
    fn allow(basis: DecisionBasis) -> Self {
        Self {
            allowed: true,
            reason: None,
            basis,
            error: None,
        }
    }

    fn deny(basis: DecisionBasis, error: AuthzError) -> Self {
        Self {
            allowed: false,
            reason: Some(error.to_string()),
            basis,
            error: Some(error),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Convert into a `Result` for callers that propagate denials with `?`.
    pub fn into_result(self) -> Result<(), AuthzError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Stateless permission checker.
///
/// - No IO
/// - No panics
/// - Effective permissions are re-derived from the user on every call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionChecker {
    owner_policy: OwnerPolicy,
}

impl PermissionChecker {
    pub fn new(owner_policy: OwnerPolicy) -> Self {
        Self { owner_policy }
    }

    /// Checker with the journal's default owner exceptions.
    pub fn journal_default() -> Self {
        Self::new(OwnerPolicy::journal_default())
    }

    pub fn owner_policy(&self) -> &OwnerPolicy {
        &self.owner_policy
    }

    /// Decide whether `user` may exercise `capability` (`resource.ACTION`).
    pub fn check(
        &self,
        user: Option<&User>,
        capability: &str,
        context: Option<&OwnershipContext>,
    ) -> AccessDecision {
        let Some(user) = user else {
            tracing::debug!(capability, "permission denied: no user");
            return AccessDecision::deny(DecisionBasis::NotAuthenticated, AuthzError::NotAuthenticated);
        };

        let permission = match capability.parse::<Permission>() {
            Ok(permission) => permission,
            Err(err) => {
                tracing::debug!(user_id = %user.id, capability, error = %err, "invalid capability");
                return AccessDecision::deny(
                    DecisionBasis::InvalidCapability,
                    AuthzError::InvalidCapability(capability.to_string()),
                );
            }
        };

        self.check_permission(user, &permission, context)
    }

    /// Typed variant of [`check`](Self::check) for callers that already hold a
    /// [`Permission`].
    pub fn check_permission(
        &self,
        user: &User,
        permission: &Permission,
        context: Option<&OwnershipContext>,
    ) -> AccessDecision {
        let effective = user.effective_permissions();
        let decision = self.decide(user.id, &effective, permission, context);

        tracing::debug!(
            user_id = %user.id,
            role = %user.role.name,
            capability = %permission,
            allowed = decision.allowed,
            basis = ?decision.basis,
            "permission check"
        );

        decision
    }

    fn decide(
        &self,
        user_id: UserId,
        effective: &PermissionSet,
        permission: &Permission,
        context: Option<&OwnershipContext>,
    ) -> AccessDecision {
        if effective.has_system_admin() {
            return AccessDecision::allow(DecisionBasis::SystemAdmin);
        }
        if effective.contains(permission) {
            return AccessDecision::allow(DecisionBasis::ExactGrant);
        }
        if Permission::wildcard(permission.resource()).is_some_and(|all| effective.contains(&all)) {
            return AccessDecision::allow(DecisionBasis::ResourceWildcard);
        }
        if context.is_some_and(|ctx| ctx.is_owned_by(user_id)) && self.owner_policy.permits(permission) {
            return AccessDecision::allow(DecisionBasis::OwnResource);
        }

        AccessDecision::deny(
            DecisionBasis::MissingPermission,
            AuthzError::Forbidden(permission.to_string()),
        )
    }

    /// Explain a decision in detail (for audit views and debugging).
    ///
    /// `known_roles` is used to suggest roles that would grant the capability.
    pub fn explain(
        &self,
        user: Option<&User>,
        capability: &str,
        context: Option<&OwnershipContext>,
        known_roles: &[RoleGrant],
    ) -> AuthorizationExplanation {
        let decision = self.check(user, capability, context);

        let effective = user.map(User::effective_permissions).unwrap_or_default();
        let suggestions = if decision.allowed {
            Vec::new()
        } else {
            suggestions_for(capability, known_roles, decision.basis)
        };

        AuthorizationExplanation {
            capability: capability.to_string(),
            user_id: user.map(|u| u.id),
            role: user.map(|u| u.role.name.clone()),
            effective_permissions: effective.to_strings(),
            has_system_admin: effective.has_system_admin(),
            decision,
            suggestions,
        }
    }
}

fn suggestions_for(capability: &str, known_roles: &[RoleGrant], basis: DecisionBasis) -> Vec<String> {
    match basis {
        DecisionBasis::NotAuthenticated => vec!["Sign in before requesting this action".to_string()],
        DecisionBasis::InvalidCapability => {
            vec![format!("'{capability}' is not a catalogue permission (expected resource.ACTION)")]
        }
        _ => {
            let Ok(permission) = capability.parse::<Permission>() else {
                return Vec::new();
            };
            let mut suggestions = vec![format!("Grant '{capability}' directly to the user")];
            let granting: Vec<&str> = known_roles
                .iter()
                .filter(|role| role.permissions.covers(&permission))
                .map(|role| role.name.as_str())
                .collect();
            if !granting.is_empty() {
                suggestions.insert(0, format!("Assign one of the roles: {}", granting.join(", ")));
            }
            suggestions
        }
    }
}

/// Detailed, serializable explanation of a permission check.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub capability: String,
    pub user_id: Option<UserId>,
    pub role: Option<String>,
    pub decision: AccessDecision,
    /// Sorted role ∪ direct permissions.
    pub effective_permissions: Vec<String>,
    pub has_system_admin: bool,
    pub suggestions: Vec<String>,
}

/// `checkPermission` with the default owner policy.
pub fn check_permission(
    user: Option<&User>,
    capability: &str,
    context: Option<&OwnershipContext>,
) -> AccessDecision {
    PermissionChecker::journal_default().check(user, capability, context)
}

/// Authorize a typed permission, propagating denial as an error.
pub fn authorize(
    user: &User,
    required: &Permission,
    context: Option<&OwnershipContext>,
) -> Result<(), AuthzError> {
    PermissionChecker::journal_default()
        .check_permission(user, required, context)
        .into_result()
}

/// Authorize if any of `alternatives` is allowed; reports the first one on failure.
///
/// An empty list authorizes nothing and is reported as an invalid capability.
pub fn authorize_any(user: &User, alternatives: &[Permission]) -> Result<(), AuthzError> {
    let Some(first) = alternatives.first() else {
        return Err(AuthzError::InvalidCapability("no permission requested".to_string()));
    };
    let checker = PermissionChecker::new(OwnerPolicy::none());
    if alternatives
        .iter()
        .any(|p| checker.check_permission(user, p, None).allowed)
    {
        return Ok(());
    }
    Err(AuthzError::Forbidden(first.to_string()))
}

/// Privilege escalation guard: `actor` may only hand out permissions their own
/// effective set covers.
pub fn ensure_can_delegate(actor: &User, requested: &PermissionSet) -> Result<(), AuthzError> {
    let held = actor.effective_permissions();
    match requested.iter().find(|p| !held.covers(p)) {
        Some(missing) => {
            tracing::warn!(actor = %actor.id, permission = %missing, "delegation refused");
            Err(AuthzError::Forbidden(missing.to_string()))
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(role_perms: &[&str], direct: &[&str]) -> User {
        User {
            id: UserId::new(),
            display_name: "Test".to_string(),
            role: RoleGrant {
                name: "Test Role".to_string(),
                is_system: false,
                permissions: PermissionSet::parse_all(role_perms).unwrap(),
            },
            permissions: PermissionSet::parse_all(direct).unwrap(),
        }
    }

    #[test]
    fn absent_user_is_not_authenticated() {
        let decision = check_permission(None, "article.READ", None);
        assert!(!decision.allowed);
        assert_eq!(decision.reason(), Some("not authenticated"));
        assert_eq!(decision.basis, DecisionBasis::NotAuthenticated);
    }

    #[test]
    fn missing_permission_reason_matches_contract() {
        let user = user_with(&["article.READ"], &[]);
        let decision = check_permission(Some(&user), "article.UPDATE", None);
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason(),
            Some("insufficient permissions: missing article.UPDATE")
        );
    }

    #[test]
    fn serialized_denial_has_allowed_and_reason() {
        let user = user_with(&["article.READ"], &[]);
        let json = serde_json::to_value(check_permission(Some(&user), "article.UPDATE", None)).unwrap();
        assert_eq!(json["allowed"], false);
        assert_eq!(json["reason"], "insufficient permissions: missing article.UPDATE");

        let json = serde_json::to_value(check_permission(Some(&user), "article.READ", None)).unwrap();
        assert_eq!(json["allowed"], true);
        assert!(json.get("reason").is_none());
        assert_eq!(json["basis"], "exact_grant");
    }

    #[test]
    fn system_admin_allows_anything_valid() {
        let admin = user_with(&["SYSTEM.ADMIN"], &[]);
        for capability in ["article.DELETE", "role.CREATE", "SYSTEM.ROLE_MANAGEMENT", "user.ALL"] {
            let decision = check_permission(Some(&admin), capability, None);
            assert!(decision.allowed, "{capability}");
            assert_eq!(decision.basis, DecisionBasis::SystemAdmin);
        }
    }

    #[test]
    fn malformed_capability_is_denied_even_for_admin() {
        let admin = user_with(&["SYSTEM.ADMIN"], &[]);
        let decision = check_permission(Some(&admin), "articleUPDATE", None);
        assert!(!decision.allowed);
        assert_eq!(decision.basis, DecisionBasis::InvalidCapability);
        assert_eq!(decision.reason(), Some("invalid capability: articleUPDATE"));

        assert!(!check_permission(Some(&admin), "blog.READ", None).allowed);
    }

    #[test]
    fn resource_wildcard_grants_every_action_on_that_resource() {
        let editor = user_with(&["article.ALL"], &[]);
        for capability in ["article.CREATE", "article.READ", "article.UPDATE", "article.DELETE"] {
            let decision = check_permission(Some(&editor), capability, None);
            assert!(decision.allowed, "{capability}");
            assert_eq!(decision.basis, DecisionBasis::ResourceWildcard);
        }
        assert!(!check_permission(Some(&editor), "author.CREATE", None).allowed);
    }

    #[test]
    fn direct_permissions_are_unioned_with_role() {
        let user = user_with(&["article.READ"], &["media.CREATE"]);
        assert!(check_permission(Some(&user), "media.CREATE", None).allowed);
        assert!(check_permission(Some(&user), "article.READ", None).allowed);
        assert!(!check_permission(Some(&user), "media.DELETE", None).allowed);
    }

    #[test]
    fn owner_exception_applies_only_to_own_resource() {
        let user = user_with(&["article.READ"], &[]);
        let own = OwnershipContext::new(user.id, user.id);
        let decision = check_permission(Some(&user), "article.UPDATE", Some(&own));
        assert!(decision.allowed);
        assert_eq!(decision.basis, DecisionBasis::OwnResource);

        let foreign = OwnershipContext::new(UserId::new(), user.id);
        assert!(!check_permission(Some(&user), "article.UPDATE", Some(&foreign)).allowed);

        // Context about someone else entirely.
        let other = UserId::new();
        let unrelated = OwnershipContext::new(other, other);
        assert!(!check_permission(Some(&user), "article.UPDATE", Some(&unrelated)).allowed);
    }

    #[test]
    fn owner_exception_respects_policy() {
        let user = user_with(&[], &[]);
        let own = OwnershipContext::new(user.id, user.id);
        assert!(!check_permission(Some(&user), "media.UPDATE", Some(&own)).allowed);
        assert!(!check_permission(Some(&user), "article.CREATE", Some(&own)).allowed);

        let strict = PermissionChecker::new(OwnerPolicy::none());
        assert!(!strict.check(Some(&user), "article.UPDATE", Some(&own)).allowed);
    }

    #[test]
    fn into_result_maps_basis_to_error() {
        let user = user_with(&[], &[]);
        let checker = PermissionChecker::journal_default();
        assert_eq!(
            checker.check(Some(&user), "role.DELETE", None).into_result(),
            Err(AuthzError::Forbidden("role.DELETE".to_string()))
        );
        assert_eq!(
            checker.check(None, "role.DELETE", None).into_result(),
            Err(AuthzError::NotAuthenticated)
        );
        assert_eq!(
            checker.check(Some(&user), "role", None).into_result(),
            Err(AuthzError::InvalidCapability("role".to_string()))
        );
    }

    #[test]
    fn authorize_typed_permission() {
        let user = user_with(&["notification.ALL"], &[]);
        assert!(authorize(&user, &"notification.CREATE".parse().unwrap(), None).is_ok());
        assert_eq!(
            authorize(&user, &"user.READ".parse().unwrap(), None),
            Err(AuthzError::Forbidden("user.READ".to_string()))
        );
    }

    #[test]
    fn authorize_any_accepts_alternative_grant() {
        let manager = user_with(&["SYSTEM.ROLE_MANAGEMENT"], &[]);
        let needed = [Permission::ROLE_MANAGEMENT, "role.CREATE".parse().unwrap()];
        assert!(authorize_any(&manager, &needed).is_ok());

        let nobody = user_with(&[], &[]);
        assert_eq!(
            authorize_any(&nobody, &needed),
            Err(AuthzError::Forbidden("SYSTEM.ROLE_MANAGEMENT".to_string()))
        );
    }

    #[test]
    fn authorize_any_rejects_empty_alternatives() {
        let admin = user_with(&["SYSTEM.ADMIN"], &[]);
        let err = authorize_any(&admin, &[]).unwrap_err();
        assert_eq!(err, AuthzError::InvalidCapability("no permission requested".to_string()));
        assert_eq!(err.to_string(), "invalid capability: no permission requested");
    }

    #[test]
    fn delegation_is_limited_to_held_permissions() {
        let editor = user_with(&["article.ALL", "media.READ"], &[]);
        let ok = PermissionSet::parse_all(["article.UPDATE", "media.READ"]).unwrap();
        assert!(ensure_can_delegate(&editor, &ok).is_ok());

        let escalation = PermissionSet::parse_all(["media.READ", "user.DELETE"]).unwrap();
        assert_eq!(
            ensure_can_delegate(&editor, &escalation),
            Err(AuthzError::Forbidden("user.DELETE".to_string()))
        );

        let admin = user_with(&["SYSTEM.ADMIN"], &[]);
        assert!(ensure_can_delegate(&admin, &escalation).is_ok());
    }

    #[test]
    fn explanation_suggests_granting_roles() {
        let user = user_with(&["article.READ"], &[]);
        let roles = vec![
            RoleGrant {
                name: "Editor".to_string(),
                is_system: false,
                permissions: PermissionSet::parse_all(["article.ALL"]).unwrap(),
            },
            RoleGrant {
                name: "Reader".to_string(),
                is_system: true,
                permissions: PermissionSet::parse_all(["article.READ"]).unwrap(),
            },
        ];

        let explanation =
            PermissionChecker::journal_default().explain(Some(&user), "article.DELETE", None, &roles);
        assert!(!explanation.decision.allowed);
        assert_eq!(explanation.effective_permissions, vec!["article.READ".to_string()]);
        assert!(!explanation.has_system_admin);
        assert_eq!(explanation.suggestions[0], "Assign one of the roles: Editor");
        assert_eq!(explanation.suggestions.len(), 2);
    }

    #[test]
    fn explanation_of_allowed_check_has_no_suggestions() {
        let admin = user_with(&["SYSTEM.ADMIN"], &[]);
        let explanation = PermissionChecker::journal_default().explain(Some(&admin), "user.DELETE", None, &[]);
        assert!(explanation.decision.allowed);
        assert!(explanation.has_system_admin);
        assert!(explanation.suggestions.is_empty());
    }

    mod proptest_tests {
        use super::*;
        use crate::catalogue::all_permissions;
        use proptest::prelude::*;

        fn any_permission() -> impl Strategy<Value = Permission> {
            let all = all_permissions();
            (0..all.len()).prop_map(move |i| all[i])
        }

        fn any_set() -> impl Strategy<Value = PermissionSet> {
            prop::collection::vec(any_permission(), 0..8).prop_map(|v| v.into_iter().collect())
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: SYSTEM.ADMIN allows every catalogue permission.
            #[test]
            fn system_admin_allows_all(requested in any_permission(), extra in any_set()) {
                let mut user = user_with(&["SYSTEM.ADMIN"], &[]);
                user.permissions = extra;
                let decision = check_permission(Some(&user), &requested.to_string(), None);
                prop_assert!(decision.allowed);
            }

            /// Property: no grants means every check is denied without an owned context.
            #[test]
            fn empty_user_denied(requested in any_permission()) {
                let user = user_with(&[], &[]);
                let decision = check_permission(Some(&user), &requested.to_string(), None);
                prop_assert!(!decision.allowed);
                prop_assert_eq!(
                    decision.reason,
                    Some(format!("insufficient permissions: missing {requested}"))
                );
            }

            /// Property: repeated checks yield identical decisions.
            #[test]
            fn check_is_idempotent(
                role in any_set(),
                direct in any_set(),
                requested in any_permission(),
                owned in any::<bool>()
            ) {
                let mut user = user_with(&[], &[]);
                user.role.permissions = role;
                user.permissions = direct;
                let ctx = if owned {
                    OwnershipContext::new(user.id, user.id)
                } else {
                    OwnershipContext::new(UserId::new(), user.id)
                };
                let before = user.clone();

                let first = check_permission(Some(&user), &requested.to_string(), Some(&ctx));
                let second = check_permission(Some(&user), &requested.to_string(), Some(&ctx));
                prop_assert_eq!(first, second);
                prop_assert_eq!(user, before);
            }

            /// Property: allowed iff the effective set covers the request (no context).
            #[test]
            fn allowed_matches_coverage(role in any_set(), direct in any_set(), requested in any_permission()) {
                let mut user = user_with(&[], &[]);
                user.role.permissions = role;
                user.permissions = direct;
                let decision = check_permission(Some(&user), &requested.to_string(), None);
                prop_assert_eq!(decision.allowed, user.effective_permissions().covers(&requested));
            }

            /// Property: strings without a separator never pass.
            #[test]
            fn separator_free_strings_denied(capability in "[A-Za-z_]{0,24}") {
                let admin = user_with(&["SYSTEM.ADMIN"], &[]);
                let decision = check_permission(Some(&admin), &capability, None);
                prop_assert!(!decision.allowed);
                prop_assert_eq!(decision.basis, DecisionBasis::InvalidCapability);
            }
        }
    }
}
