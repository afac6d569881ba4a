use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::errors::AppError;

use super::ports::{ActorDirectory, ActorProfile, GlobalRole, MembershipSource, PermissionCatalog, RolePermissionSource};

/// Actor directory over the `users` table. Soft-deleted accounts resolve
/// to `None` and therefore deny.
#[derive(Clone)]
pub struct SqlxActorDirectory {
    pool: SqlitePool,
}

impl SqlxActorDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActorDirectory for SqlxActorDirectory {
    async fn by_id(&self, actor_id: Uuid) -> Result<Option<ActorProfile>, AppError> {
        let row = sqlx::query(
            "SELECT global_role, role_id FROM users WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(actor_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let global_role: String = row.get("global_role");
        let role_id: Option<String> = row.get("role_id");
        let role_id = role_id
            .map(|id| Uuid::parse_str(&id))
            .transpose()
            .map_err(|err| AppError::internal(format!("invalid role id on user {actor_id}: {err}")))?;

        Ok(Some(ActorProfile {
            global_role: GlobalRole::from_str(&global_role)?,
            role_id,
        }))
    }
}

/// Flattens the role/permission join into plain codes.
#[derive(Clone)]
pub struct SqlxRolePermissionSource {
    pool: SqlitePool,
}

impl SqlxRolePermissionSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RolePermissionSource for SqlxRolePermissionSource {
    async fn permissions_of_role(&self, role_id: Uuid) -> Result<HashSet<String>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT p.code
            FROM permissions p
            INNER JOIN role_permissions rp ON p.id = rp.permission_id
            WHERE rp.role_id = ?
            "#,
        )
        .bind(role_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("code")).collect())
    }
}

/// Membership overrides out of `project_members`; the permission set is a
/// JSON text array written by the project subsystem.
#[derive(Clone)]
pub struct SqlxMembershipSource {
    pool: SqlitePool,
}

impl SqlxMembershipSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipSource for SqlxMembershipSource {
    async fn membership_of(&self, resource_id: Uuid, actor_id: Uuid) -> Result<Option<Vec<String>>, AppError> {
        let row = sqlx::query(
            "SELECT permissions FROM project_members WHERE project_id = ? AND user_id = ?",
        )
        .bind(resource_id.to_string())
        .bind(actor_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.get("permissions");
        let permissions: Vec<String> = serde_json::from_str(&raw)
            .map_err(|err| AppError::internal(format!("invalid membership permission set: {err}")))?;

        Ok(Some(permissions))
    }
}

/// Catalog lookup over the seeded `permissions` table.
#[derive(Clone)]
pub struct SqlxPermissionCatalog {
    pool: SqlitePool,
}

impl SqlxPermissionCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionCatalog for SqlxPermissionCatalog {
    async fn known_codes(&self) -> Result<HashSet<String>, AppError> {
        let rows = sqlx::query("SELECT code FROM permissions")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|r| r.get("code")).collect())
    }
}
