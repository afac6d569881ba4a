use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::permissions;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::task::{DbTask, Task, TaskCreateRequest, TaskUpdateRequest};
use crate::routes::projects::fetch_project;
use crate::utils::utc_now;

const DEFAULT_STATUS: &str = "pending";

#[utoipa::path(
    get,
    path = "/projects/{project_id}/tasks",
    tag = "Tasks",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "List tasks", body = [Task])),
    security(("bearerAuth" = []))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<Task>>> {
    // Resource-scoped: a membership override on this project is enough.
    state
        .engine
        .require(auth.user_id, permissions::TASKS_VIEW, Some(project_id))
        .await?;
    fetch_project(&state.pool, project_id).await?;

    let tasks = sqlx::query_as::<_, DbTask>(
        "SELECT id, project_id, title, status, due_date, created_at, updated_at, deleted_at FROM tasks WHERE project_id = ? AND deleted_at IS NULL ORDER BY created_at",
    )
    .bind(project_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let tasks: Vec<Task> = tasks.into_iter().map(Task::try_from).collect::<Result<_, _>>()?;
    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/tasks",
    tag = "Tasks",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = TaskCreateRequest,
    responses((status = 201, description = "Task created", body = Task)),
    security(("bearerAuth" = []))
)]
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    state
        .engine
        .require(auth.user_id, permissions::TASKS_CREATE, Some(project_id))
        .await?;
    fetch_project(&state.pool, project_id).await?;

    let now = utc_now();
    let task_id = Uuid::new_v4();
    let status = payload.status.clone().unwrap_or_else(|| DEFAULT_STATUS.to_string());

    sqlx::query(
        "INSERT INTO tasks (id, project_id, title, status, due_date, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(task_id.to_string())
    .bind(project_id.to_string())
    .bind(&payload.title)
    .bind(&status)
    .bind(payload.due_date)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let task: Task = fetch_task(&state.pool, project_id, task_id).await?.try_into()?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    put,
    path = "/projects/{project_id}/tasks/{id}",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id"),
    ),
    request_body = TaskUpdateRequest,
    responses((status = 200, description = "Task updated", body = Task)),
    security(("bearerAuth" = []))
)]
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<TaskUpdateRequest>,
) -> AppResult<Json<Task>> {
    state
        .engine
        .require(auth.user_id, permissions::TASKS_EDIT, Some(project_id))
        .await?;

    let mut task: Task = fetch_task(&state.pool, project_id, id).await?.try_into()?;

    if let Some(title) = payload.title.as_ref() {
        task.title = title.clone();
    }
    if let Some(status) = payload.status.as_ref() {
        task.status = status.clone();
    }
    if payload.due_date.is_some() {
        task.due_date = payload.due_date;
    }

    let now = utc_now();
    sqlx::query("UPDATE tasks SET title = ?, status = ?, due_date = ?, updated_at = ? WHERE id = ?")
        .bind(&task.title)
        .bind(&task.status)
        .bind(task.due_date)
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    task.updated_at = now;
    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}/tasks/{id}",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id"),
    ),
    responses((status = 204, description = "Task soft deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    state
        .engine
        .require(auth.user_id, permissions::TASKS_DELETE, Some(project_id))
        .await?;

    let _ = fetch_task(&state.pool, project_id, id).await?;

    let now = utc_now();
    sqlx::query("UPDATE tasks SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_task(pool: &SqlitePool, project_id: Uuid, task_id: Uuid) -> AppResult<DbTask> {
    sqlx::query_as::<_, DbTask>(
        "SELECT id, project_id, title, status, due_date, created_at, updated_at, deleted_at FROM tasks WHERE id = ? AND project_id = ? AND deleted_at IS NULL",
    )
    .bind(task_id.to_string())
    .bind(project_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("task not found"))
}
