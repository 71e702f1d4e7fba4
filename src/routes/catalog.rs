//! Catalog routes: module definitions, lists, roles and permissions, audit log.

use crate::handlers::catalog::{
    add_value, audit, create_list, create_module, create_role, delete_list, delete_module,
    get_list, get_module, list_lists, list_modules, list_roles, list_values, permissions_of,
    rename_value, set_permission, set_role_state, set_value_state, update_module,
};
use crate::state::AppState;
use axum::{
    routing::{get, patch, put},
    Router,
};

pub fn catalog_routes(state: AppState) -> Router {
    Router::new()
        .route("/modules", get(list_modules).post(create_module))
        .route(
            "/modules/:module_id",
            get(get_module).put(update_module).delete(delete_module),
        )
        .route("/lists", get(list_lists).post(create_list))
        .route("/lists/:list_id", get(get_list).delete(delete_list))
        .route("/lists/:list_id/values", get(list_values).post(add_value))
        .route("/list-values/:value_id/label", put(rename_value))
        .route("/list-values/:value_id/state", put(set_value_state))
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:role_id/state", patch(set_role_state))
        .route("/roles/:role_id/permissions", get(permissions_of))
        .route("/roles/:role_id/permissions/:module_id", put(set_permission))
        .route("/audit", get(audit))
        .with_state(state)
}
