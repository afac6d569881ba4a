use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{permissions, OVERRIDE_ALL};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::AuthUser;
use crate::models::project::{
    DbProject, DbProjectMember, MemberUpsertRequest, Project, ProjectCreateRequest, ProjectMember,
    ProjectUpdateRequest,
};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    responses((status = 200, description = "List projects visible to the caller", body = [Project])),
    security(("bearerAuth" = []))
)]
pub async fn list_projects(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Project>>> {
    // Role-level (or admin) view permission covers the whole register.
    if state
        .engine
        .check(auth.user_id, permissions::PROJECTS_VIEW, None)
        .await
        .is_allowed()
    {
        let projects = sqlx::query_as::<_, DbProject>(
            "SELECT id, name, description, created_by, created_at, updated_at, deleted_at FROM projects WHERE deleted_at IS NULL ORDER BY created_at DESC",
        )
        .fetch_all(&state.pool)
        .await?;

        let projects: Vec<Project> = projects
            .into_iter()
            .map(Project::try_from)
            .collect::<Result<_, _>>()?;
        return Ok(Json(projects));
    }

    // Otherwise the caller only sees projects a membership override lets
    // them view; each candidate goes through the full check so the
    // override semantics stay in one place.
    let candidates = sqlx::query_as::<_, DbProject>(
        r#"
        SELECT p.id, p.name, p.description, p.created_by, p.created_at, p.updated_at, p.deleted_at
        FROM projects p
        INNER JOIN project_members pm ON pm.project_id = p.id
        WHERE pm.user_id = ? AND p.deleted_at IS NULL
        ORDER BY p.created_at DESC
        "#,
    )
    .bind(auth.user_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let mut visible = Vec::new();
    for candidate in candidates {
        let project: Project = candidate.try_into()?;
        if state
            .engine
            .check(auth.user_id, permissions::PROJECTS_VIEW, Some(project.id))
            .await
            .is_allowed()
        {
            visible.push(project);
        }
    }

    Ok(Json(visible))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses((status = 201, description = "Project created", body = Project)),
    security(("bearerAuth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    state
        .engine
        .require(auth.user_id, permissions::PROJECTS_CREATE, None)
        .await?;

    let now = utc_now();
    let project_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO projects (id, name, description, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id.to_string())
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    // The creator gets a full override on their own project so they can
    // work on it regardless of role.
    sqlx::query(
        "INSERT INTO project_members (project_id, user_id, permissions, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(project_id.to_string())
    .bind(auth.user_id.to_string())
    .bind(serde_json::to_string(&[OVERRIDE_ALL]).unwrap_or_else(|_| "[]".into()))
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let project: Project = fetch_project(&state.pool, project_id).await?.try_into()?;

    log_activity(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &project,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Project detail", body = Project)),
    security(("bearerAuth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    state
        .engine
        .require(auth.user_id, permissions::PROJECTS_VIEW, Some(id))
        .await?;

    let project: Project = fetch_project(&state.pool, id).await?.try_into()?;
    Ok(Json(project))
}

#[utoipa::path(
    put,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses((status = 200, description = "Project updated", body = Project)),
    security(("bearerAuth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProjectUpdateRequest>,
) -> AppResult<Json<Project>> {
    state
        .engine
        .require(auth.user_id, permissions::PROJECTS_EDIT, Some(id))
        .await?;

    let mut project: Project = fetch_project(&state.pool, id).await?.try_into()?;

    if let Some(name) = payload.name.as_ref() {
        project.name = name.clone();
    }
    if payload.description.is_some() {
        project.description = payload.description.clone();
    }

    let now = utc_now();

    sqlx::query("UPDATE projects SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&project.name)
        .bind(&project.description)
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    project.updated_at = now;
    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 204, description = "Project soft deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .engine
        .require(auth.user_id, permissions::PROJECTS_DELETE, Some(id))
        .await?;

    let project: Project = fetch_project(&state.pool, id).await?.try_into()?;
    let now = utc_now();

    // Membership overrides die with the resource they scope.
    let mut tx = state.pool.begin().await?;
    sqlx::query("UPDATE projects SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM project_members WHERE project_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    log_activity(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &project,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// MEMBERSHIP OVERRIDES
// =============================================================================

#[utoipa::path(
    get,
    path = "/projects/{id}/members",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Membership overrides", body = [ProjectMember])),
    security(("bearerAuth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<ProjectMember>>> {
    state
        .engine
        .require(auth.user_id, permissions::PROJECTS_MEMBERS, Some(id))
        .await?;
    fetch_project(&state.pool, id).await?;

    let members = sqlx::query_as::<_, DbProjectMember>(
        "SELECT project_id, user_id, permissions, created_at, updated_at FROM project_members WHERE project_id = ? ORDER BY created_at",
    )
    .bind(id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let members: Vec<ProjectMember> = members
        .into_iter()
        .map(ProjectMember::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(members))
}

#[utoipa::path(
    put,
    path = "/projects/{id}/members/{user_id}",
    tag = "Projects",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "User id"),
    ),
    request_body = MemberUpsertRequest,
    responses(
        (status = 200, description = "Membership override upserted", body = ProjectMember),
        (status = 400, description = "Unknown permission code"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn upsert_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<MemberUpsertRequest>,
) -> AppResult<Json<ProjectMember>> {
    state
        .engine
        .require(auth.user_id, permissions::PROJECTS_MEMBERS, Some(id))
        .await?;
    fetch_project(&state.pool, id).await?;
    ensure_user_exists(&state.pool, user_id).await?;

    // Overrides are an allow-list over the same catalog the roles use;
    // the lone extra token is "*".
    let known = state.catalog.known_codes().await?;
    for code in &payload.permissions {
        if code != OVERRIDE_ALL && !known.contains(code) {
            return Err(AppError::bad_request(format!("unknown permission code: {code}")));
        }
    }

    let now = utc_now();
    let permissions_json = serde_json::to_string(&payload.permissions)
        .map_err(|err| AppError::bad_request(format!("invalid permission set: {err}")))?;

    sqlx::query(
        r#"
        INSERT INTO project_members (project_id, user_id, permissions, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(project_id, user_id) DO UPDATE SET permissions = excluded.permissions, updated_at = excluded.updated_at
        "#,
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .bind(&permissions_json)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let member = sqlx::query_as::<_, DbProjectMember>(
        "SELECT project_id, user_id, permissions, created_at, updated_at FROM project_members WHERE project_id = ? AND user_id = ?",
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .fetch_one(&state.pool)
    .await?;
    let member: ProjectMember = member.try_into()?;

    log_activity(
        &state.event_bus,
        "granted",
        Some(auth.user_id),
        &member,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(member))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}/members/{user_id}",
    tag = "Projects",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "User id"),
    ),
    responses((status = 204, description = "Membership override removed")),
    security(("bearerAuth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    state
        .engine
        .require(auth.user_id, permissions::PROJECTS_MEMBERS, Some(id))
        .await?;

    let member = sqlx::query_as::<_, DbProjectMember>(
        "SELECT project_id, user_id, permissions, created_at, updated_at FROM project_members WHERE project_id = ? AND user_id = ?",
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("membership not found"))?;
    let member: ProjectMember = member.try_into()?;

    sqlx::query("DELETE FROM project_members WHERE project_id = ? AND user_id = ?")
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity(
        &state.event_bus,
        "revoked",
        Some(auth.user_id),
        &member,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_project(pool: &SqlitePool, project_id: Uuid) -> AppResult<DbProject> {
    sqlx::query_as::<_, DbProject>(
        "SELECT id, name, description, created_by, created_at, updated_at, deleted_at FROM projects WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(project_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("project not found"))
}

async fn ensure_user_exists(pool: &SqlitePool, user_id: Uuid) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ? AND deleted_at IS NULL")
        .bind(user_id.to_string())
        .fetch_one(pool)
        .await?;

    if count == 0 {
        return Err(AppError::not_found("user not found"));
    }
    Ok(())
}
