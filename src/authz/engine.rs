use std::sync::Arc;

use uuid::Uuid;

use crate::errors::AppError;

use super::ports::{ActorDirectory, MembershipSource, RolePermissionSource};
use super::OVERRIDE_ALL;

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    fn denied(code: &str) -> Self {
        Decision::Denied {
            reason: format!("permission denied: {code} is required"),
        }
    }
}

/// The resolution engine. Holds no cross-call state; every check performs
/// fresh reads against the injected collaborators so decisions always
/// reflect the latest role/permission/membership rows.
pub struct PermissionEngine {
    actors: Arc<dyn ActorDirectory>,
    role_permissions: Arc<dyn RolePermissionSource>,
    memberships: Arc<dyn MembershipSource>,
}

impl PermissionEngine {
    pub fn new(
        actors: Arc<dyn ActorDirectory>,
        role_permissions: Arc<dyn RolePermissionSource>,
        memberships: Arc<dyn MembershipSource>,
    ) -> Self {
        Self {
            actors,
            role_permissions,
            memberships,
        }
    }

    /// Resolve whether `actor_id` may perform `required`, optionally scoped
    /// to one resource.
    ///
    /// Steps, in strict order, each short-circuiting on allow:
    /// 1. resolve the actor profile; an unknown actor denies
    /// 2. global `admin` allows unconditionally
    /// 3. the assigned role's codes are scanned (exact or `module.*`
    ///    wildcard); a miss falls through rather than denying, because a
    ///    membership override may still grant the code
    /// 4. with a resource id, the membership override set allows on the
    ///    exact code or the `"*"` token
    /// 5. deny
    ///
    /// Fail-closed: any collaborator error resolves to a deny, never an
    /// allow and never a surfaced fault.
    pub async fn check(&self, actor_id: Uuid, required: &str, resource_id: Option<Uuid>) -> Decision {
        match self.resolve(actor_id, required, resource_id).await {
            Ok(decision) => decision,
            Err(err) => {
                tracing::warn!(
                    actor_id = %actor_id,
                    permission = %required,
                    error = %err,
                    "authorization store fault, denying"
                );
                Decision::denied(required)
            }
        }
    }

    /// True when at least one of `codes` resolves to an allow (OR).
    /// Each code re-runs the full pipeline; overrides are code-specific,
    /// so no partial state is shared between iterations.
    pub async fn any_of(&self, actor_id: Uuid, codes: &[&str], resource_id: Option<Uuid>) -> bool {
        for code in codes {
            if self.check(actor_id, code, resource_id).await.is_allowed() {
                return true;
            }
        }
        false
    }

    /// True only when every code in `codes` resolves to an allow (AND).
    pub async fn all_of(&self, actor_id: Uuid, codes: &[&str], resource_id: Option<Uuid>) -> bool {
        for code in codes {
            if !self.check(actor_id, code, resource_id).await.is_allowed() {
                return false;
            }
        }
        true
    }

    /// Handler-facing wrapper: maps a deny onto `AppError::Forbidden`
    /// carrying the reason string.
    pub async fn require(&self, actor_id: Uuid, required: &str, resource_id: Option<Uuid>) -> Result<(), AppError> {
        match self.check(actor_id, required, resource_id).await {
            Decision::Allowed => Ok(()),
            Decision::Denied { reason } => Err(AppError::forbidden(reason)),
        }
    }

    async fn resolve(&self, actor_id: Uuid, required: &str, resource_id: Option<Uuid>) -> Result<Decision, AppError> {
        // Required codes are always concrete actions; a wildcard on the
        // requirement side is undefined and treated as disallowed input.
        if required == OVERRIDE_ALL || required.ends_with(".*") {
            tracing::debug!(permission = %required, "wildcard required code rejected");
            return Ok(Decision::denied(required));
        }

        // 1. Actor profile. An unresolvable actor must never fail open;
        // the reason stays generic so callers cannot enumerate accounts.
        let profile = match self.actors.by_id(actor_id).await? {
            Some(profile) => profile,
            None => {
                tracing::debug!(actor_id = %actor_id, permission = %required, "actor not found");
                return Ok(Decision::denied(required));
            }
        };

        // 2. Admin bypass, intentionally ahead of every other source.
        if profile.is_admin() {
            tracing::debug!(actor_id = %actor_id, permission = %required, "admin bypass");
            return Ok(Decision::Allowed);
        }

        // 3. Role scan. A miss here falls through to the override check
        // instead of denying: an actor with no role (or an insufficient
        // one) may still hold a resource-level grant.
        if let Some(role_id) = profile.role_id {
            let granted = self.role_permissions.permissions_of_role(role_id).await?;
            if granted.iter().any(|code| code_matches(code, required)) {
                tracing::debug!(
                    actor_id = %actor_id,
                    role_id = %role_id,
                    permission = %required,
                    "role permission match"
                );
                return Ok(Decision::Allowed);
            }
        }

        // 4. Membership override, only when the caller scoped the check.
        if let Some(resource_id) = resource_id {
            if let Some(overrides) = self.memberships.membership_of(resource_id, actor_id).await? {
                if overrides.iter().any(|code| code == required || code == OVERRIDE_ALL) {
                    tracing::debug!(
                        actor_id = %actor_id,
                        resource_id = %resource_id,
                        permission = %required,
                        "membership override match"
                    );
                    return Ok(Decision::Allowed);
                }
            }
        }

        // 5. All sources exhausted.
        tracing::debug!(actor_id = %actor_id, permission = %required, "permission denied");
        Ok(Decision::denied(required))
    }
}

/// Whether a granted code satisfies a required one: exact equality, or a
/// `module.*` wildcard whose prefix (dot included) starts the required
/// code. The dot keeps `projects.*` from matching `projectsomething.edit`.
fn code_matches(granted: &str, required: &str) -> bool {
    if granted == required {
        return true;
    }
    match granted.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('.') => required.starts_with(prefix),
        _ => false,
    }
}
