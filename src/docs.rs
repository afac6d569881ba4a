use axum::{routing::get, Json, Router};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes::health::HealthResponse;

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::project::Project,
            models::project::ProjectCreateRequest,
            models::project::ProjectUpdateRequest,
            models::project::ProjectMember,
            models::project::MemberUpsertRequest,
            models::task::Task,
            models::task::TaskCreateRequest,
            models::task::TaskUpdateRequest,
            models::rbac::Role,
            models::rbac::RoleSummary,
            models::rbac::RoleCreateRequest,
            models::rbac::ReplacePermissionsRequest,
            models::rbac::RolePermissionsResponse,
            models::rbac::Permission,
            models::rbac::RoleAssignment,
            models::rbac::AssignRoleRequest,
            HealthResponse
        )
    ),
    tags(
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Projects", description = "Project register and membership overrides"),
        (name = "Tasks", description = "Task management"),
        (name = "RBAC", description = "Role and permission administration"),
        (name = "Health", description = "Liveness probes")
    )
)]
pub struct ApiDoc;

/// Swagger UI plus the raw OpenAPI document, with a bearer scheme so the
/// Authorize dialog sends the JWT.
pub fn router() -> anyhow::Result<Router> {
    let mut doc = serde_json::to_value(ApiDoc::openapi())?;

    if let Some(components) = doc.pointer_mut("/components").and_then(|c| c.as_object_mut()) {
        components.insert(
            "securitySchemes".to_string(),
            serde_json::json!({
                "bearerAuth": {
                    "type": "http",
                    "scheme": "bearer",
                    "bearerFormat": "JWT"
                }
            }),
        );
    }

    let openapi_json = doc.clone();
    let docs_route = Router::new().route(
        "/api-docs/openapi.json",
        get(move || {
            let v = openapi_json.clone();
            async move { Json(v) }
        }),
    );

    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .persist_authorization(true);

    Ok(docs_route.merge(SwaggerUi::new("/docs").config(swagger_config)))
}
