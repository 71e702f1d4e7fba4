//! Record handlers: list, read, create, update, soft delete, grouped and filtered views.

use crate::actor::Actor;
use crate::error::AppError;
use crate::response::{success_created, success_many, success_one};
use crate::service::{ListQuery, ReadMode, RecordService};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};

fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::Validation("body must be a JSON object".into())),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadParams {
    #[serde(default)]
    pub mode: ReadMode,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateParams {
    #[serde(default)]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FilterParams {
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub limit: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    actor: Actor,
    Path(module_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let rows = RecordService::list(&state, &actor, module_id, &query).await?;
    Ok(success_many(rows))
}

pub async fn read(
    State(state): State<AppState>,
    actor: Actor,
    Path((module_id, id)): Path<(i64, i64)>,
    Query(params): Query<ReadParams>,
) -> Result<impl IntoResponse, AppError> {
    let row = RecordService::read(&state, &actor, module_id, id, params.mode).await?;
    Ok(success_one(row))
}

pub async fn create(
    State(state): State<AppState>,
    actor: Actor,
    Path(module_id): Path<i64>,
    Query(params): Query<CreateParams>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let payload = body_to_map(body)?;
    let id = RecordService::create(&state, &actor, module_id, params.parent_id, &payload).await?;
    Ok(success_created(id))
}

pub async fn update(
    State(state): State<AppState>,
    actor: Actor,
    Path((module_id, id)): Path<(i64, i64)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let payload = body_to_map(body)?;
    RecordService::update(&state, &actor, module_id, id, &payload).await?;
    let row = RecordService::read(&state, &actor, module_id, id, ReadMode::Display).await?;
    Ok(success_one(row))
}

pub async fn delete(
    State(state): State<AppState>,
    actor: Actor,
    Path((module_id, id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    RecordService::delete(&state, &actor, module_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn grouped(
    State(state): State<AppState>,
    actor: Actor,
    Path((module_id, field)): Path<(i64, String)>,
) -> Result<impl IntoResponse, AppError> {
    let groups = RecordService::grouped(&state, &actor, module_id, &field).await?;
    Ok(success_many(groups))
}

pub async fn filtered(
    State(state): State<AppState>,
    actor: Actor,
    Path(module_id): Path<i64>,
    Query(params): Query<FilterParams>,
) -> Result<impl IntoResponse, AppError> {
    let rows = RecordService::filtered(
        &state,
        &actor,
        module_id,
        &params.field,
        &Value::String(params.value),
        params.limit,
    )
    .await?;
    Ok(success_many(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_must_be_object() {
        assert!(body_to_map(serde_json::json!({"Name": "Ana"})).is_ok());
        assert!(matches!(body_to_map(serde_json::json!([1])), Err(AppError::Validation(_))));
    }
}
