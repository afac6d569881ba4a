use std::sync::Arc;

use anyhow::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

use sitedesk::authz::{
    PermissionEngine, RoleAdmin, SqlxActorDirectory, SqlxMembershipSource, SqlxPermissionCatalog,
    SqlxRolePermissionSource,
};
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

fn engine(pool: &SqlitePool) -> PermissionEngine {
    PermissionEngine::new(
        Arc::new(SqlxActorDirectory::new(pool.clone())),
        Arc::new(SqlxRolePermissionSource::new(pool.clone())),
        Arc::new(SqlxMembershipSource::new(pool.clone())),
    )
}

fn admin(pool: &SqlitePool) -> RoleAdmin {
    RoleAdmin::new(pool.clone(), Arc::new(SqlxPermissionCatalog::new(pool.clone())))
}

async fn insert_user(pool: &SqlitePool, global_role: &str, role_id: Option<Uuid>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, global_role, role_id, created_at, updated_at) VALUES (?, ?, ?, 'x', ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(format!("user {id}"))
    .bind(format!("{id}@example.com"))
    .bind(global_role)
    .bind(role_id.map(|r| r.to_string()))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

async fn insert_project(pool: &SqlitePool, created_by: Uuid) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO projects (id, name, created_by, created_at, updated_at) VALUES (?, 'Test Project', ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(created_by.to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

async fn insert_membership(pool: &SqlitePool, project_id: Uuid, user_id: Uuid, codes: &[&str]) -> Result<()> {
    let now = utc_now();
    sqlx::query(
        "INSERT INTO project_members (project_id, user_id, permissions, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(project_id.to_string())
    .bind(user_id.to_string())
    .bind(serde_json::to_string(codes)?)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

#[tokio::test]
async fn admin_flag_bypasses_role_and_override_state() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let engine = engine(&pool);

    let admin_user = insert_user(&pool, "admin", None).await?;
    let project = insert_project(&pool, admin_user).await?;

    assert!(engine.check(admin_user, "finance.edit", None).await.is_allowed());
    assert!(engine.check(admin_user, "boq.approve", Some(project)).await.is_allowed());

    Ok(())
}

#[tokio::test]
async fn role_grants_resolve_with_exact_and_wildcard_codes() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let engine = engine(&pool);
    let admin = admin(&pool);

    let role = admin
        .create_role("estimator", None, &["boq.*".to_string(), "projects.view".to_string()])
        .await?
        .role;
    let user = insert_user(&pool, "employee", Some(role.id)).await?;

    // Exact
    assert!(engine.check(user, "projects.view", None).await.is_allowed());
    assert!(!engine.check(user, "projects.edit", None).await.is_allowed());

    // Wildcard, dot boundary respected
    assert!(engine.check(user, "boq.edit", None).await.is_allowed());
    assert!(engine.check(user, "boq.approve", None).await.is_allowed());
    assert!(!engine.check(user, "boqish.edit", None).await.is_allowed());

    Ok(())
}

#[tokio::test]
async fn seeded_viewer_role_is_read_only() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let engine = engine(&pool);

    let viewer_role: String = sqlx::query_scalar("SELECT id FROM roles WHERE name = 'viewer'")
        .fetch_one(&pool)
        .await?;
    let user = insert_user(&pool, "employee", Some(Uuid::parse_str(&viewer_role)?)).await?;

    assert!(engine.check(user, "projects.view", None).await.is_allowed());
    assert!(engine.check(user, "tasks.view", None).await.is_allowed());
    assert!(!engine.check(user, "tasks.edit", None).await.is_allowed());
    assert!(!engine.check(user, "projects.delete", None).await.is_allowed());

    Ok(())
}

#[tokio::test]
async fn membership_override_is_independent_of_role() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let engine = engine(&pool);

    let owner = insert_user(&pool, "admin", None).await?;
    let user = insert_user(&pool, "employee", None).await?;
    let project = insert_project(&pool, owner).await?;
    insert_membership(&pool, project, user, &["inventory.add"]).await?;

    // Scoped to the project the override names: allowed.
    assert!(engine.check(user, "inventory.add", Some(project)).await.is_allowed());
    // No resource scope supplied: the override never applies.
    assert!(!engine.check(user, "inventory.add", None).await.is_allowed());
    // A different project: denied.
    let other = insert_project(&pool, owner).await?;
    assert!(!engine.check(user, "inventory.add", Some(other)).await.is_allowed());

    Ok(())
}

#[tokio::test]
async fn insufficient_role_still_falls_through_to_override() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let engine = engine(&pool);
    let admin = admin(&pool);

    let role = admin
        .create_role("clerk", None, &["tasks.view".to_string()])
        .await?
        .role;
    let owner = insert_user(&pool, "admin", None).await?;
    let user = insert_user(&pool, "employee", Some(role.id)).await?;
    let project = insert_project(&pool, owner).await?;
    insert_membership(&pool, project, user, &["boq.edit"]).await?;

    // The role scan misses boq.edit but the override supplies it.
    assert!(engine.check(user, "boq.edit", Some(project)).await.is_allowed());

    Ok(())
}

#[tokio::test]
async fn deny_by_default_and_unknown_actor() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let engine = engine(&pool);

    let user = insert_user(&pool, "employee", None).await?;
    assert!(!engine.check(user, "projects.view", None).await.is_allowed());

    // An id that resolves to no profile must deny, never error.
    assert!(!engine.check(Uuid::new_v4(), "projects.view", None).await.is_allowed());

    Ok(())
}

#[tokio::test]
async fn batch_variants_rerun_the_full_check_per_code() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let engine = engine(&pool);
    let admin = admin(&pool);

    let role = admin
        .create_role("viewer_only", None, &["designs.view".to_string()])
        .await?
        .role;
    let owner = insert_user(&pool, "admin", None).await?;
    let user = insert_user(&pool, "employee", Some(role.id)).await?;

    assert!(engine.any_of(user, &["designs.view", "designs.approve"], None).await);
    assert!(!engine.all_of(user, &["designs.view", "designs.approve"], None).await);

    // One code satisfied by role, the other only by a scoped override:
    // all_of holds only when the resource id is supplied.
    let project = insert_project(&pool, owner).await?;
    insert_membership(&pool, project, user, &["designs.approve"]).await?;
    assert!(engine.all_of(user, &["designs.view", "designs.approve"], Some(project)).await);
    assert!(!engine.all_of(user, &["designs.view", "designs.approve"], None).await);

    Ok(())
}

#[tokio::test]
async fn soft_deleted_user_is_denied() -> Result<()> {
    let (pool, _dir) = setup().await?;
    let engine = engine(&pool);

    let user = insert_user(&pool, "admin", None).await?;
    sqlx::query("UPDATE users SET deleted_at = ? WHERE id = ?")
        .bind(utc_now())
        .bind(user.to_string())
        .execute(&pool)
        .await?;

    assert!(!engine.check(user, "projects.view", None).await.is_allowed());

    Ok(())
}
