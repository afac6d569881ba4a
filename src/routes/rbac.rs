//! RBAC administration routes: thin wrappers around `RoleAdmin`.
//!
//! Every endpoint is itself permission-checked through the engine, so
//! administration is gated the same way as any other operation (the
//! global admin flag bypasses, as everywhere). Mutations land in the
//! activity log with Critical severity.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::permissions;
use crate::errors::AppResult;
use crate::events::{log_activity, RequestContext};
use crate::jwt::AuthUser;
use crate::models::rbac::{
    AssignRoleRequest, Permission, ReplacePermissionsRequest, Role, RoleAssignment, RoleCreateRequest,
    RolePermissionsResponse, RoleSummary,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:role_id", get(get_role).delete(delete_role))
        .route(
            "/roles/:role_id/permissions",
            get(get_role_permissions).put(replace_role_permissions),
        )
        .route("/permissions", get(list_permissions))
        .route("/users/:user_id/role", put(assign_role))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleCreatedResponse {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<String>,
}

/// List roles with member counts
#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    responses((status = 200, description = "Roles ordered by name", body = [RoleSummary])),
    security(("bearerAuth" = []))
)]
async fn list_roles(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<RoleSummary>>> {
    state
        .engine
        .require(auth.user_id, permissions::ROLES_VIEW, None)
        .await?;

    Ok(Json(state.admin.list_roles().await?))
}

/// Create a role with an initial permission set
#[utoipa::path(
    post,
    path = "/rbac/roles",
    tag = "RBAC",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = RoleCreatedResponse),
        (status = 400, description = "Unknown permission code"),
        (status = 409, description = "Role name already exists"),
    ),
    security(("bearerAuth" = []))
)]
async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(req): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<RoleCreatedResponse>)> {
    state
        .engine
        .require(auth.user_id, permissions::ROLES_MANAGE, None)
        .await?;

    let mutation = state
        .admin
        .create_role(&req.name, req.description.as_deref(), &req.permissions)
        .await?;

    log_activity(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &mutation.role,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((
        StatusCode::CREATED,
        Json(RoleCreatedResponse {
            role: mutation.role,
            permissions: mutation.permissions,
        }),
    ))
}

/// Get a role by id
#[utoipa::path(
    get,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role details", body = Role),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
async fn get_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Role>> {
    state
        .engine
        .require(auth.user_id, permissions::ROLES_VIEW, None)
        .await?;

    Ok(Json(state.admin.get_role(role_id).await?))
}

/// Delete a role
#[utoipa::path(
    delete,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "System role, or still referenced by users"),
    ),
    security(("bearerAuth" = []))
)]
async fn delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .engine
        .require(auth.user_id, permissions::ROLES_MANAGE, None)
        .await?;

    let role = state.admin.delete_role(role_id).await?;

    log_activity(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &role,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Flattened permission codes of a role
#[utoipa::path(
    get,
    path = "/rbac/roles/{role_id}/permissions",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Permission codes", body = RolePermissionsResponse),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
async fn get_role_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<RolePermissionsResponse>> {
    state
        .engine
        .require(auth.user_id, permissions::ROLES_VIEW, None)
        .await?;

    let codes = state.admin.permissions_of(role_id).await?;
    Ok(Json(RolePermissionsResponse {
        role_id,
        permissions: codes,
        warning: None,
    }))
}

/// Replace a role's permission set wholesale
#[utoipa::path(
    put,
    path = "/rbac/roles/{role_id}/permissions",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role id")),
    request_body = ReplacePermissionsRequest,
    responses(
        (status = 200, description = "Permission set replaced", body = RolePermissionsResponse),
        (status = 400, description = "Unknown permission code"),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
async fn replace_role_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
    Json(req): Json<ReplacePermissionsRequest>,
) -> AppResult<Json<RolePermissionsResponse>> {
    state
        .engine
        .require(auth.user_id, permissions::ROLES_MANAGE, None)
        .await?;

    let mutation = state
        .admin
        .replace_role_permissions(role_id, &req.permissions)
        .await?;

    log_activity(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &mutation.role,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(RolePermissionsResponse {
        role_id,
        permissions: mutation.permissions,
        warning: mutation.warning,
    }))
}

/// List the permission catalog
#[utoipa::path(
    get,
    path = "/rbac/permissions",
    tag = "RBAC",
    responses((status = 200, description = "Catalog ordered by code", body = [Permission])),
    security(("bearerAuth" = []))
)]
async fn list_permissions(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Permission>>> {
    state
        .engine
        .require(auth.user_id, permissions::ROLES_VIEW, None)
        .await?;

    Ok(Json(state.admin.list_catalog().await?))
}

/// Assign or clear a user's role
#[utoipa::path(
    put,
    path = "/rbac/users/{user_id}/role",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "User id")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assignment updated", body = RoleAssignment),
        (status = 404, description = "User or role not found"),
    ),
    security(("bearerAuth" = []))
)]
async fn assign_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AssignRoleRequest>,
) -> AppResult<Json<RoleAssignment>> {
    state
        .engine
        .require(auth.user_id, permissions::USERS_MANAGE, None)
        .await?;

    state.admin.assign_role(user_id, req.role_id).await?;

    let assignment = RoleAssignment {
        user_id,
        role_id: req.role_id,
    };

    log_activity(
        &state.event_bus,
        "assigned",
        Some(auth.user_id),
        &assignment,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(assignment))
}
