//! Catalog handlers: modules, lists, roles and the audit log.

use crate::actor::Actor;
use crate::audit::{AuditFilter, AuditRecorder};
use crate::catalog::{ModuleCatalog, ModuleFilter, ModuleSpec, Status};
use crate::error::AppError;
use crate::lists::{ListRegistry, NewList, NewListValue};
use crate::permission::{Grants, NewRole, RoleStore};
use crate::response::{success_created, success_many, success_one};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct StateBody {
    pub state: Status,
}

#[derive(Debug, Deserialize)]
pub struct LabelBody {
    pub label: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValuesParams {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn list_modules(
    State(state): State<AppState>,
    _actor: Actor,
    Query(filter): Query<ModuleFilter>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_many(ModuleCatalog::list_modules(&state, &filter).await?))
}

pub async fn get_module(
    State(state): State<AppState>,
    _actor: Actor,
    Path(module_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_one(ModuleCatalog::get_module(&state, module_id).await?))
}

pub async fn create_module(
    State(state): State<AppState>,
    actor: Actor,
    Json(spec): Json<ModuleSpec>,
) -> Result<impl IntoResponse, AppError> {
    let id = ModuleCatalog::create_module(&state, &actor, spec).await?;
    Ok(success_created(id))
}

pub async fn update_module(
    State(state): State<AppState>,
    actor: Actor,
    Path(module_id): Path<i64>,
    Json(spec): Json<ModuleSpec>,
) -> Result<impl IntoResponse, AppError> {
    ModuleCatalog::update_module(&state, &actor, module_id, spec).await?;
    Ok(success_one(ModuleCatalog::get_module(&state, module_id).await?))
}

pub async fn delete_module(
    State(state): State<AppState>,
    actor: Actor,
    Path(module_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ModuleCatalog::delete_module(&state, &actor, module_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_lists(State(state): State<AppState>, _actor: Actor) -> Result<impl IntoResponse, AppError> {
    Ok(success_many(ListRegistry::list_lists(&state).await?))
}

pub async fn get_list(
    State(state): State<AppState>,
    _actor: Actor,
    Path(list_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_one(ListRegistry::get_list(&state, list_id).await?))
}

pub async fn create_list(
    State(state): State<AppState>,
    actor: Actor,
    Json(new): Json<NewList>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_created(ListRegistry::create_list(&state, &actor, new).await?))
}

pub async fn list_values(
    State(state): State<AppState>,
    _actor: Actor,
    Path(list_id): Path<i64>,
    Query(params): Query<ValuesParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_many(
        ListRegistry::list_values_of(&state, list_id, params.active_only).await?,
    ))
}

pub async fn add_value(
    State(state): State<AppState>,
    actor: Actor,
    Path(list_id): Path<i64>,
    Json(value): Json<NewListValue>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_created(ListRegistry::add_value(&state, &actor, list_id, value).await?))
}

pub async fn rename_value(
    State(state): State<AppState>,
    actor: Actor,
    Path(value_id): Path<i64>,
    Json(body): Json<LabelBody>,
) -> Result<impl IntoResponse, AppError> {
    ListRegistry::rename_value(&state, &actor, value_id, &body.label).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_value_state(
    State(state): State<AppState>,
    actor: Actor,
    Path(value_id): Path<i64>,
    Json(body): Json<StateBody>,
) -> Result<impl IntoResponse, AppError> {
    ListRegistry::set_value_state(&state, &actor, value_id, body.state).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_list(
    State(state): State<AppState>,
    actor: Actor,
    Path(list_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ListRegistry::delete_list(&state, &actor, list_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_roles(State(state): State<AppState>, _actor: Actor) -> Result<impl IntoResponse, AppError> {
    Ok(success_many(RoleStore::list_roles(&state).await?))
}

pub async fn create_role(
    State(state): State<AppState>,
    actor: Actor,
    Json(role): Json<NewRole>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_created(RoleStore::create_role(&state, &actor, role).await?))
}

pub async fn set_role_state(
    State(state): State<AppState>,
    actor: Actor,
    Path(role_id): Path<i64>,
    Json(body): Json<StateBody>,
) -> Result<impl IntoResponse, AppError> {
    RoleStore::set_role_state(&state, &actor, role_id, body.state).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn permissions_of(
    State(state): State<AppState>,
    _actor: Actor,
    Path(role_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_many(RoleStore::permissions_of(&state, role_id).await?))
}

pub async fn set_permission(
    State(state): State<AppState>,
    actor: Actor,
    Path((role_id, module_id)): Path<(i64, i64)>,
    Json(grants): Json<Grants>,
) -> Result<impl IntoResponse, AppError> {
    RoleStore::set_permission(&state, &actor, role_id, module_id, grants).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn audit(
    State(state): State<AppState>,
    actor: Actor,
    Query(filter): Query<AuditFilter>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_many(AuditRecorder::query(&state, &actor, &filter).await?))
}
