//! Authorization module - Permission Resolution Engine
//!
//! Decides, for an actor, a required permission code and an optional
//! resource scope, whether an operation is allowed. Three sources are
//! reconciled, in order of privilege breadth:
//! - global `admin` flag (unconditional bypass)
//! - the actor's role and its permission codes (with `module.*` wildcards)
//! - per-project membership overrides (additive allow-list, may hold `"*"`)
//!
//! The engine is stateless between calls and fail-closed: a missing actor
//! or a store fault always resolves to a deny.

mod admin;
mod engine;
mod ports;
mod store;

pub use admin::{RoleAdmin, RoleMutation};
pub use engine::{Decision, PermissionEngine};
pub use ports::{ActorDirectory, ActorProfile, GlobalRole, MembershipSource, PermissionCatalog, RolePermissionSource};
pub use store::{SqlxActorDirectory, SqlxMembershipSource, SqlxPermissionCatalog, SqlxRolePermissionSource};

/// Override token granting every permission within one resource scope.
pub const OVERRIDE_ALL: &str = "*";

/// Well-known system role names (seeded by migration)
pub mod roles {
    pub const PROJECT_MANAGER: &str = "project_manager";
    pub const SITE_ENGINEER: &str = "site_engineer";
    pub const VIEWER: &str = "viewer";
}

/// Well-known permission codes
pub mod permissions {
    // Projects
    pub const PROJECTS_VIEW: &str = "projects.view";
    pub const PROJECTS_CREATE: &str = "projects.create";
    pub const PROJECTS_EDIT: &str = "projects.edit";
    pub const PROJECTS_DELETE: &str = "projects.delete";
    pub const PROJECTS_MEMBERS: &str = "projects.members";

    // Tasks
    pub const TASKS_VIEW: &str = "tasks.view";
    pub const TASKS_CREATE: &str = "tasks.create";
    pub const TASKS_EDIT: &str = "tasks.edit";
    pub const TASKS_DELETE: &str = "tasks.delete";

    // Bill of quantities
    pub const BOQ_VIEW: &str = "boq.view";
    pub const BOQ_EDIT: &str = "boq.edit";
    pub const BOQ_APPROVE: &str = "boq.approve";

    // Designs
    pub const DESIGNS_VIEW: &str = "designs.view";
    pub const DESIGNS_UPLOAD: &str = "designs.upload";
    pub const DESIGNS_APPROVE: &str = "designs.approve";

    // Finance
    pub const FINANCE_VIEW: &str = "finance.view";
    pub const FINANCE_EDIT: &str = "finance.edit";

    // Inventory
    pub const INVENTORY_VIEW: &str = "inventory.view";
    pub const INVENTORY_ADD: &str = "inventory.add";
    pub const INVENTORY_ISSUE: &str = "inventory.issue";

    // Leave
    pub const LEAVE_REQUEST: &str = "leave.request";
    pub const LEAVE_APPROVE: &str = "leave.approve";

    // RBAC administration
    pub const ROLES_VIEW: &str = "roles.view";
    pub const ROLES_MANAGE: &str = "roles.manage";
    pub const USERS_VIEW: &str = "users.view";
    pub const USERS_MANAGE: &str = "users.manage";
}
