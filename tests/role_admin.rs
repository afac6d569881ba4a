use std::sync::Arc;

use anyhow::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

use sitedesk::authz::{RoleAdmin, SqlxPermissionCatalog};
use sitedesk::errors::AppError;
use sitedesk::utils::utc_now;

async fn setup() -> Result<(SqlitePool, TempDir)> {
    let dir = tempdir()?;
    let db_path = dir.path().join("test.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    Ok((pool, dir))
}

fn admin(pool: &SqlitePool) -> RoleAdmin {
    RoleAdmin::new(pool.clone(), Arc::new(SqlxPermissionCatalog::new(pool.clone())))
}

async fn insert_user_with_role(pool: &SqlitePool, role_id: Uuid) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, global_role, role_id, created_at, updated_at) VALUES (?, 'U', ?, 'x', 'employee', ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(format!("{id}@example.com"))
    .bind(role_id.to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

#[tokio::test]
async fn create_role_deduplicates_and_orders_codes() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let admin = admin(&pool);

    let mutation = admin
        .create_role(
            "surveyor",
            Some("QS team"),
            &["boq.view".to_string(), "boq.edit".to_string(), "boq.view".to_string()],
        )
        .await?;

    assert_eq!(mutation.permissions, vec!["boq.edit", "boq.view"]);
    assert!(mutation.warning.is_none());
    assert!(!mutation.role.is_system);

    let codes = admin.permissions_of(mutation.role.id).await?;
    assert_eq!(codes, vec!["boq.edit", "boq.view"]);

    Ok(())
}

#[tokio::test]
async fn create_role_rejects_duplicate_name_and_unknown_code() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let admin = admin(&pool);

    admin.create_role("surveyor", None, &[]).await?;

    let err = admin.create_role("surveyor", None, &[]).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "expected conflict, got {err:?}");

    let err = admin
        .create_role("other", None, &["boq.detonate".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)), "expected bad request, got {err:?}");

    Ok(())
}

#[tokio::test]
async fn replace_is_wholesale_and_idempotent() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let admin = admin(&pool);

    let role = admin
        .create_role("surveyor", None, &["boq.view".to_string(), "finance.view".to_string()])
        .await?
        .role;

    let codes = vec!["tasks.view".to_string(), "tasks.edit".to_string(), "tasks.view".to_string()];
    admin.replace_role_permissions(role.id, &codes).await?;
    admin.replace_role_permissions(role.id, &codes).await?;

    // No residue from the initial set, no duplicates from the double call.
    let flattened = admin.permissions_of(role.id).await?;
    assert_eq!(flattened, vec!["tasks.edit", "tasks.view"]);

    Ok(())
}

#[tokio::test]
async fn replacing_a_system_role_warns_but_succeeds() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let admin = admin(&pool);

    let viewer_id: String = sqlx::query_scalar("SELECT id FROM roles WHERE name = 'viewer'")
        .fetch_one(&pool)
        .await?;
    let viewer_id = Uuid::parse_str(&viewer_id)?;

    let mutation = admin
        .replace_role_permissions(viewer_id, &["projects.view".to_string()])
        .await?;

    assert!(mutation.warning.is_some());
    assert_eq!(admin.permissions_of(viewer_id).await?, vec!["projects.view"]);

    Ok(())
}

#[tokio::test]
async fn system_roles_cannot_be_deleted() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let admin = admin(&pool);

    let viewer_id: String = sqlx::query_scalar("SELECT id FROM roles WHERE name = 'viewer'")
        .fetch_one(&pool)
        .await?;

    let err = admin.delete_role(Uuid::parse_str(&viewer_id)?).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "expected conflict, got {err:?}");

    Ok(())
}

#[tokio::test]
async fn referenced_roles_cannot_be_deleted_and_stay_intact() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let admin = admin(&pool);

    let role = admin
        .create_role("surveyor", None, &["boq.view".to_string()])
        .await?
        .role;
    insert_user_with_role(&pool, role.id).await?;

    let err = admin.delete_role(role.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "expected conflict, got {err:?}");

    // Role and its assignments survive the refused delete.
    assert_eq!(admin.get_role(role.id).await?.name, "surveyor");
    assert_eq!(admin.permissions_of(role.id).await?, vec!["boq.view"]);

    Ok(())
}

#[tokio::test]
async fn unreferenced_tenant_role_deletes_cleanly() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let admin = admin(&pool);

    let role = admin
        .create_role("temp", None, &["leave.request".to_string()])
        .await?
        .role;

    admin.delete_role(role.id).await?;

    let err = admin.get_role(role.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let orphaned: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM role_permissions WHERE role_id = ?")
        .bind(role.id.to_string())
        .fetch_one(&pool)
        .await?;
    assert_eq!(orphaned, 0);

    Ok(())
}

#[tokio::test]
async fn assign_role_validates_the_target_role() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let admin = admin(&pool);

    let role = admin.create_role("surveyor", None, &[]).await?.role;
    let user = insert_user_with_role(&pool, role.id).await?;

    // Unknown role id: refused, profile untouched.
    let err = admin.assign_role(user, Some(Uuid::new_v4())).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Clearing the assignment is allowed; the user then has zero
    // role-derived permissions.
    admin.assign_role(user, None).await?;
    let role_id: Option<String> = sqlx::query_scalar("SELECT role_id FROM users WHERE id = ?")
        .bind(user.to_string())
        .fetch_one(&pool)
        .await?;
    assert!(role_id.is_none());

    Ok(())
}

#[tokio::test]
async fn member_counts_follow_live_profiles() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let admin = admin(&pool);

    let role = admin.create_role("surveyor", None, &[]).await?.role;
    let user = insert_user_with_role(&pool, role.id).await?;
    insert_user_with_role(&pool, role.id).await?;

    let summary = admin
        .list_roles()
        .await?
        .into_iter()
        .find(|s| s.role.id == role.id)
        .expect("created role listed");
    assert_eq!(summary.member_count, 2);

    // Soft-deleted profiles stop counting.
    sqlx::query("UPDATE users SET deleted_at = ? WHERE id = ?")
        .bind(utc_now())
        .bind(user.to_string())
        .execute(&pool)
        .await?;
    let summary = admin
        .list_roles()
        .await?
        .into_iter()
        .find(|s| s.role.id == role.id)
        .expect("created role listed");
    assert_eq!(summary.member_count, 1);

    Ok(())
}
