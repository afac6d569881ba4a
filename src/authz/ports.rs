use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Global role flag on a user account. `Admin` satisfies every permission
/// check unconditionally; `Employee` relies on role and membership grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GlobalRole {
    Admin,
    Employee,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::Admin => "admin",
            GlobalRole::Employee => "employee",
        }
    }
}

impl FromStr for GlobalRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(GlobalRole::Admin),
            "employee" => Ok(GlobalRole::Employee),
            other => Err(AppError::internal(format!("unknown global role: {other}"))),
        }
    }
}

/// The slice of a user profile the resolution algorithm needs.
#[derive(Debug, Clone)]
pub struct ActorProfile {
    pub global_role: GlobalRole,
    pub role_id: Option<Uuid>,
}

impl ActorProfile {
    pub fn is_admin(&self) -> bool {
        self.global_role == GlobalRole::Admin
    }
}

/// Actor directory lookup. `None` means the id does not resolve to a live
/// account; the engine turns that into a deny rather than an error.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    async fn by_id(&self, actor_id: Uuid) -> Result<Option<ActorProfile>, AppError>;
}

/// Flattened role -> permission-code lookup. A missing or empty role
/// contributes an empty set.
#[async_trait]
pub trait RolePermissionSource: Send + Sync {
    async fn permissions_of_role(&self, role_id: Uuid) -> Result<HashSet<String>, AppError>;
}

/// Per-resource membership override lookup. `None` (no membership) is not
/// an error; it simply grants nothing.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn membership_of(&self, resource_id: Uuid, actor_id: Uuid) -> Result<Option<Vec<String>>, AppError>;
}

/// The closed universe of permission codes. Role administration validates
/// caller-supplied codes against it; nothing mutates it at runtime.
#[async_trait]
pub trait PermissionCatalog: Send + Sync {
    async fn known_codes(&self) -> Result<HashSet<String>, AppError>;

    async fn exists(&self, code: &str) -> Result<bool, AppError> {
        Ok(self.known_codes().await?.contains(code))
    }
}
