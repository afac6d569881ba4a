use std::collections::BTreeSet;
use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::rbac::{DbPermission, DbRole, Permission, Role, RoleSummary};
use crate::utils::utc_now;

use super::ports::PermissionCatalog;

/// Result of a role-permission mutation. `warning` is populated when the
/// mutation touched a system role; the change goes through regardless
/// (administrators may need to fix a mis-seeded role) but callers should
/// surface it.
#[derive(Debug, Clone)]
pub struct RoleMutation {
    pub role: Role,
    pub permissions: Vec<String>,
    pub warning: Option<String>,
}

/// Role administration: the only writer of the role registry. All
/// mutations run in a single transaction so a role is never observable
/// with a half-replaced permission set.
pub struct RoleAdmin {
    pool: SqlitePool,
    catalog: Arc<dyn PermissionCatalog>,
}

impl RoleAdmin {
    pub fn new(pool: SqlitePool, catalog: Arc<dyn PermissionCatalog>) -> Self {
        Self { pool, catalog }
    }

    pub async fn get_role(&self, role_id: Uuid) -> Result<Role, AppError> {
        let db_role = sqlx::query_as::<_, DbRole>(
            "SELECT id, name, description, is_system, created_at, updated_at FROM roles WHERE id = ?",
        )
        .bind(role_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("role not found"))?;

        db_role.try_into()
    }

    /// Roles ordered by name, each with the number of live user profiles
    /// referencing it.
    pub async fn list_roles(&self) -> Result<Vec<RoleSummary>, AppError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            #[sqlx(flatten)]
            role: DbRole,
            member_count: i64,
        }

        let rows = sqlx::query_as::<_, Row>(
            r#"
            SELECT r.id, r.name, r.description, r.is_system, r.created_at, r.updated_at,
                   COUNT(u.id) AS member_count
            FROM roles r
            LEFT JOIN users u ON u.role_id = r.id AND u.deleted_at IS NULL
            GROUP BY r.id
            ORDER BY r.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RoleSummary {
                    role: row.role.try_into()?,
                    member_count: row.member_count,
                })
            })
            .collect()
    }

    /// Flattened permission codes of one role, ordered.
    pub async fn permissions_of(&self, role_id: Uuid) -> Result<Vec<String>, AppError> {
        // Existence check first so an unknown role is a 404, not an empty set.
        self.get_role(role_id).await?;

        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT p.code
            FROM permissions p
            INNER JOIN role_permissions rp ON p.id = rp.permission_id
            WHERE rp.role_id = ?
            ORDER BY p.code
            "#,
        )
        .bind(role_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// The full permission catalog, ordered by code.
    pub async fn list_catalog(&self) -> Result<Vec<Permission>, AppError> {
        let rows = sqlx::query_as::<_, DbPermission>(
            "SELECT id, code, module, description FROM permissions ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Permission::try_from).collect()
    }

    /// Create a role with an initial permission set. Fails with `Conflict`
    /// on a name collision and `BadRequest` when a code is absent from the
    /// catalog.
    pub async fn create_role(
        &self,
        name: &str,
        description: Option<&str>,
        codes: &[String],
    ) -> Result<RoleMutation, AppError> {
        let codes = self.validated_codes(codes).await?;

        let taken: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM roles WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        if taken > 0 {
            return Err(AppError::conflict(format!("role '{name}' already exists")));
        }

        let role_id = Uuid::new_v4();
        let now = utc_now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO roles (id, name, description, is_system, created_at, updated_at) VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(role_id.to_string())
        .bind(name)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        insert_assignments(&mut tx, role_id, &codes).await?;

        tx.commit().await?;

        let role = Role {
            id: role_id,
            name: name.to_string(),
            description: description.map(String::from),
            is_system: false,
            created_at: now,
            updated_at: now,
        };

        Ok(RoleMutation {
            role,
            permissions: codes.into_iter().collect(),
            warning: None,
        })
    }

    /// Wholesale replacement of a role's permission set: clear and
    /// re-insert in one transaction, never a merge. Duplicate input codes
    /// collapse before insertion, so the call is idempotent.
    pub async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        codes: &[String],
    ) -> Result<RoleMutation, AppError> {
        let role = self.get_role(role_id).await?;
        let codes = self.validated_codes(codes).await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(role_id.to_string())
            .execute(&mut *tx)
            .await?;

        insert_assignments(&mut tx, role_id, &codes).await?;

        sqlx::query("UPDATE roles SET updated_at = ? WHERE id = ?")
            .bind(utc_now())
            .bind(role_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let warning = if role.is_system {
            tracing::warn!(role_id = %role_id, role = %role.name, "permission set replaced on a system role");
            Some(format!("'{}' is a system role; its permission set was replaced", role.name))
        } else {
            None
        };

        Ok(RoleMutation {
            role,
            permissions: codes.into_iter().collect(),
            warning,
        })
    }

    /// Delete a role. `Conflict` when the role is a system role or any
    /// user profile still references it; the reference check runs inside
    /// the delete transaction, closing the assign/delete race. Deleting a
    /// referenced role would silently strip its members' permissions.
    pub async fn delete_role(&self, role_id: Uuid) -> Result<Role, AppError> {
        let role = self.get_role(role_id).await?;
        if role.is_system {
            return Err(AppError::conflict(format!(
                "'{}' is a system role and cannot be deleted",
                role.name
            )));
        }

        let mut tx = self.pool.begin().await?;

        let referenced: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE role_id = ? AND deleted_at IS NULL")
                .bind(role_id.to_string())
                .fetch_one(&mut *tx)
                .await?;
        if referenced > 0 {
            return Err(AppError::conflict(format!(
                "role '{}' is assigned to {} user(s) and cannot be deleted",
                role.name, referenced
            )));
        }

        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(role_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(role_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(role)
    }

    /// Reassign (or clear) a user's role. The target role must exist;
    /// profiles are never pointed at a dangling role id.
    pub async fn assign_role(&self, user_id: Uuid, role_id: Option<Uuid>) -> Result<(), AppError> {
        if let Some(role_id) = role_id {
            self.get_role(role_id).await?;
        }

        let affected = sqlx::query("UPDATE users SET role_id = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(role_id.map(|id| id.to_string()))
            .bind(utc_now())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        if affected.rows_affected() == 0 {
            return Err(AppError::not_found("user not found"));
        }

        Ok(())
    }

    /// De-duplicate and validate codes against the catalog. Ordered set so
    /// responses are stable.
    async fn validated_codes(&self, codes: &[String]) -> Result<BTreeSet<String>, AppError> {
        let known = self.catalog.known_codes().await?;
        let mut out = BTreeSet::new();
        for code in codes {
            if !known.contains(code) {
                return Err(AppError::bad_request(format!("unknown permission code: {code}")));
            }
            out.insert(code.clone());
        }
        Ok(out)
    }
}

async fn insert_assignments(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    role_id: Uuid,
    codes: &BTreeSet<String>,
) -> Result<(), AppError> {
    let now = utc_now();
    for code in codes {
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id, created_at) SELECT ?, id, ? FROM permissions WHERE code = ?",
        )
        .bind(role_id.to_string())
        .bind(now)
        .bind(code)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}
