use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Loggable for Project {
    fn entity_type() -> &'static str { "project" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProject {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbProject> for Project {
    type Error = AppError;

    fn try_from(db: DbProject) -> Result<Self, Self::Error> {
        Ok(Project {
            id: Uuid::parse_str(&db.id)
                .map_err(|err| AppError::internal(format!("invalid project id: {err}")))?,
            name: db.name,
            description: db.description,
            created_by: Uuid::parse_str(&db.created_by)
                .map_err(|err| AppError::internal(format!("invalid user id: {err}")))?,
            created_at: db.created_at,
            updated_at: db.updated_at,
            deleted_at: db.deleted_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectCreateRequest {
    #[schema(example = "Riverside Tower")]
    pub name: String,
    #[schema(example = "14-storey mixed-use development")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

// =============================================================================
// MEMBERSHIP OVERRIDE
// =============================================================================

/// Per-project permission grant, unique per (project, user). Additive on
/// top of whatever the user's role already allows; it cannot take
/// anything away.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    /// Permission codes, or the literal `"*"` for everything on this
    /// project.
    #[schema(example = json!(["tasks.edit", "boq.view"]))]
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for ProjectMember {
    fn entity_type() -> &'static str { "project_member" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProjectMember {
    pub project_id: String,
    pub user_id: String,
    pub permissions: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbProjectMember> for ProjectMember {
    type Error = AppError;

    fn try_from(db: DbProjectMember) -> Result<Self, Self::Error> {
        Ok(ProjectMember {
            project_id: Uuid::parse_str(&db.project_id)
                .map_err(|err| AppError::internal(format!("invalid project id: {err}")))?,
            user_id: Uuid::parse_str(&db.user_id)
                .map_err(|err| AppError::internal(format!("invalid user id: {err}")))?,
            permissions: serde_json::from_str(&db.permissions)
                .map_err(|err| AppError::internal(format!("invalid membership permission set: {err}")))?,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MemberUpsertRequest {
    #[schema(example = json!(["inventory.add"]))]
    pub permissions: Vec<String>,
}
