use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Seeded roles; protected from deletion.
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbRole> for Role {
    type Error = AppError;

    fn try_from(db: DbRole) -> Result<Self, Self::Error> {
        Ok(Role {
            id: Uuid::parse_str(&db.id)
                .map_err(|err| AppError::internal(format!("invalid role id: {err}")))?,
            name: db.name,
            description: db.description,
            is_system: db.is_system,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

/// Listing shape: a role plus how many live user profiles reference it.
/// The count is an aggregation over `users`, not state the role owns.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleSummary {
    #[serde(flatten)]
    pub role: Role,
    pub member_count: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "quantity_surveyor")]
    pub name: String,
    #[schema(example = "Prepares and approves bills of quantities")]
    pub description: Option<String>,
    /// Initial permission codes; every code must exist in the catalog.
    #[serde(default)]
    #[schema(example = json!(["boq.view", "boq.edit"]))]
    pub permissions: Vec<String>,
}

/// Wholesale replacement of a role's permission set, never a merge.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplacePermissionsRequest {
    #[schema(example = json!(["boq.*", "projects.view"]))]
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RolePermissionsResponse {
    pub role_id: Uuid,
    pub permissions: Vec<String>,
    /// Set when the mutation touched a system role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

// =============================================================================
// PERMISSION (catalog entry)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    /// Dot-structured `"<module>.<action>"` code.
    #[schema(example = "projects.edit")]
    pub code: String,
    #[schema(example = "projects")]
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPermission {
    pub id: String,
    pub code: String,
    pub module: String,
    pub description: Option<String>,
}

impl TryFrom<DbPermission> for Permission {
    type Error = AppError;

    fn try_from(db: DbPermission) -> Result<Self, Self::Error> {
        Ok(Permission {
            id: Uuid::parse_str(&db.id)
                .map_err(|err| AppError::internal(format!("invalid permission id: {err}")))?,
            code: db.code,
            module: db.module,
            description: db.description,
        })
    }
}

// =============================================================================
// USER ROLE ASSIGNMENT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleAssignment {
    pub user_id: Uuid,
    /// `null` clears the assignment; the user then relies solely on
    /// membership overrides.
    pub role_id: Option<Uuid>,
}

impl Loggable for RoleAssignment {
    fn entity_type() -> &'static str { "role_assignment" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role_id: Option<Uuid>,
}
