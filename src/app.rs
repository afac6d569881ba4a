use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{
    PermissionCatalog, PermissionEngine, RoleAdmin, SqlxActorDirectory, SqlxMembershipSource,
    SqlxPermissionCatalog, SqlxRolePermissionSource,
};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, health, projects, rbac, tasks};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub engine: Arc<PermissionEngine>,
    pub admin: Arc<RoleAdmin>,
    pub catalog: Arc<dyn PermissionCatalog>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        // The engine's collaborators are injected as trait objects; tests
        // swap them for in-memory fakes.
        let engine = PermissionEngine::new(
            Arc::new(SqlxActorDirectory::new(pool.clone())),
            Arc::new(SqlxRolePermissionSource::new(pool.clone())),
            Arc::new(SqlxMembershipSource::new(pool.clone())),
        );
        let catalog: Arc<dyn PermissionCatalog> = Arc::new(SqlxPermissionCatalog::new(pool.clone()));
        let admin = RoleAdmin::new(pool.clone(), catalog.clone());

        Self {
            pool,
            jwt: Arc::new(jwt),
            engine: Arc::new(engine),
            admin: Arc::new(admin),
            catalog,
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let project_routes = Router::new()
        .route("/", get(projects::list_projects))
        .route("/", post(projects::create_project))
        .route("/:id", get(projects::get_project))
        .route("/:id", put(projects::update_project))
        .route("/:id", delete(projects::delete_project))
        .route("/:id/members", get(projects::list_members))
        .route("/:id/members/:user_id", put(projects::upsert_member))
        .route("/:id/members/:user_id", delete(projects::remove_member));

    // Tasks are scoped to a project: /projects/:project_id/tasks
    let task_routes = Router::new()
        .route("/", get(tasks::list_tasks))
        .route("/", post(tasks::create_task))
        .route("/:id", put(tasks::update_task))
        .route("/:id", delete(tasks::delete_task));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/projects", project_routes)
        .nest("/projects/:project_id/tasks", task_routes)
        .nest("/rbac", rbac::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
