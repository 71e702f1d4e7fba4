//! List registry: named enumerations that ListRef fields point to.
//!
//! Values are never physically removed while a list exists; they are deactivated
//! instead so stored keys keep resolving to their label.

use crate::actor::Actor;
use crate::audit::{AuditAction, AuditRecorder};
use crate::catalog::types::Status;
use crate::error::{AppError, StorageContext};
use crate::permission::PermissionGate;
use crate::state::AppState;
use crate::store::{FIELDS_TABLE, LISTS_TABLE, LIST_VALUES_TABLE};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize)]
pub struct List {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub state: Status,
}

#[derive(Clone, Debug, Serialize)]
pub struct ListValue {
    pub id: i64,
    pub list_id: i64,
    pub label: String,
    pub order: i32,
    pub state: Status,
}

#[derive(Clone, Debug, Serialize)]
pub struct ListDetail {
    #[serde(flatten)]
    pub list: List,
    pub values: Vec<ListValue>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewList {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Initial labels, ordered as given.
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewListValue {
    pub label: String,
    #[serde(default)]
    pub order: Option<i32>,
}

#[derive(sqlx::FromRow)]
struct ListRow {
    id: i64,
    name: String,
    description: Option<String>,
    state: String,
}

impl TryFrom<ListRow> for List {
    type Error = AppError;

    fn try_from(r: ListRow) -> Result<Self, Self::Error> {
        Ok(List {
            id: r.id,
            name: r.name,
            description: r.description,
            state: r.state.parse()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ValueRow {
    id: i64,
    list_id: i64,
    label: String,
    sort_order: i32,
    state: String,
}

impl TryFrom<ValueRow> for ListValue {
    type Error = AppError;

    fn try_from(r: ValueRow) -> Result<Self, Self::Error> {
        Ok(ListValue {
            id: r.id,
            list_id: r.list_id,
            label: r.label,
            order: r.sort_order,
            state: r.state.parse()?,
        })
    }
}

/// Trimmed, non-empty label or list name.
fn clean_name(what: &str, raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation(format!("{} is required", what)));
    }
    Ok(name.to_string())
}

/// Reject labels that repeat within one list (case-insensitive).
fn check_unique_labels(labels: &[String]) -> Result<(), AppError> {
    let mut seen: Vec<String> = Vec::with_capacity(labels.len());
    for l in labels {
        let key = l.to_lowercase();
        if seen.contains(&key) {
            return Err(AppError::Conflict(format!("duplicate list value '{}'", l)));
        }
        seen.push(key);
    }
    Ok(())
}

pub struct ListRegistry;

impl ListRegistry {
    pub async fn create_list(state: &AppState, actor: &Actor, new: NewList) -> Result<i64, AppError> {
        PermissionGate::require_administrator(state, actor, "create list").await?;
        let name = clean_name("list name", &new.name)?;
        let labels = new
            .values
            .iter()
            .map(|v| clean_name("list value label", v))
            .collect::<Result<Vec<_>, _>>()?;
        check_unique_labels(&labels)?;
        let id = state
            .bounded("create list", async {
                let mut tx = state.pool.begin().await.storage("create list")?;
                let lists = state.sys_table(LISTS_TABLE);
                let taken: bool = sqlx::query_scalar(&format!(
                    "SELECT EXISTS(SELECT 1 FROM {} WHERE lower(name) = lower($1))",
                    lists
                ))
                .bind(&name)
                .fetch_one(&mut *tx)
                .await
                .storage("create list")?;
                if taken {
                    return Err(AppError::Conflict(format!("list '{}' already exists", name)));
                }
                let id: i64 = sqlx::query_scalar(&format!(
                    "INSERT INTO {} (name, description, state) VALUES ($1, $2, 'Active') RETURNING id",
                    lists
                ))
                .bind(&name)
                .bind(&new.description)
                .fetch_one(&mut *tx)
                .await
                .storage("create list")?;
                let insert_value = format!(
                    "INSERT INTO {} (list_id, label, sort_order, state) VALUES ($1, $2, $3, 'Active')",
                    state.sys_table(LIST_VALUES_TABLE)
                );
                for (i, label) in labels.iter().enumerate() {
                    sqlx::query(&insert_value)
                        .bind(id)
                        .bind(label)
                        .bind(i as i32)
                        .execute(&mut *tx)
                        .await
                        .storage("create list")?;
                }
                tx.commit().await.storage("create list")?;
                Ok(id)
            })
            .await?;
        tracing::info!(list = %name, id, values = labels.len(), "list created");
        AuditRecorder::record(state, actor, AuditAction::Add, &format!("List: {}", name), &format!("Id: {}", id)).await;
        Ok(id)
    }

    pub async fn get_list(state: &AppState, list_id: i64) -> Result<ListDetail, AppError> {
        let list = Self::load_list(state, list_id).await?;
        let values = Self::list_values_of(state, list_id, false).await?;
        Ok(ListDetail { list, values })
    }

    pub async fn list_lists(state: &AppState) -> Result<Vec<List>, AppError> {
        state
            .bounded("list lists", async {
                let rows: Vec<ListRow> = sqlx::query_as(&format!(
                    "SELECT id, name, description, state FROM {} ORDER BY name",
                    state.sys_table(LISTS_TABLE)
                ))
                .fetch_all(&state.pool)
                .await
                .storage("list lists")?;
                rows.into_iter().map(List::try_from).collect()
            })
            .await
    }

    pub async fn add_value(
        state: &AppState,
        actor: &Actor,
        list_id: i64,
        value: NewListValue,
    ) -> Result<i64, AppError> {
        PermissionGate::require_administrator(state, actor, "add list value").await?;
        let label = clean_name("list value label", &value.label)?;
        let list = Self::load_list(state, list_id).await?;
        let id = state
            .bounded("add list value", async {
                let mut tx = state.pool.begin().await.storage("add list value")?;
                // Serializes concurrent additions to the same list.
                sqlx::query(&format!(
                    "SELECT id FROM {} WHERE id = $1 FOR UPDATE",
                    state.sys_table(LISTS_TABLE)
                ))
                .bind(list_id)
                .execute(&mut *tx)
                .await
                .storage("add list value")?;
                let values = state.sys_table(LIST_VALUES_TABLE);
                let (taken, next_order): (bool, i32) = sqlx::query_as(&format!(
                    "SELECT COALESCE(bool_or(lower(label) = lower($2)), FALSE), \
                     COALESCE(MAX(sort_order) + 1, 0) FROM {} WHERE list_id = $1",
                    values
                ))
                .bind(list_id)
                .bind(&label)
                .fetch_one(&mut *tx)
                .await
                .storage("add list value")?;
                if taken {
                    return Err(AppError::Conflict(format!(
                        "list '{}' already has value '{}'",
                        list.name, label
                    )));
                }
                let id: i64 = sqlx::query_scalar(&format!(
                    "INSERT INTO {} (list_id, label, sort_order, state) VALUES ($1, $2, $3, 'Active') RETURNING id",
                    values
                ))
                .bind(list_id)
                .bind(&label)
                .bind(value.order.unwrap_or(next_order))
                .fetch_one(&mut *tx)
                .await
                .storage("add list value")?;
                tx.commit().await.storage("add list value")?;
                Ok(id)
            })
            .await?;
        AuditRecorder::record(
            state,
            actor,
            AuditAction::Add,
            &format!("List: {}", list.name),
            &format!("Value Id: {}", id),
        )
        .await;
        Ok(id)
    }

    /// Values in display order.
    pub async fn list_values_of(
        state: &AppState,
        list_id: i64,
        active_only: bool,
    ) -> Result<Vec<ListValue>, AppError> {
        state
            .bounded("list values", async {
                let rows: Vec<ValueRow> = sqlx::query_as(&format!(
                    "SELECT id, list_id, label, sort_order, state FROM {} \
                     WHERE list_id = $1 AND (NOT $2 OR state = 'Active') ORDER BY sort_order, id",
                    state.sys_table(LIST_VALUES_TABLE)
                ))
                .bind(list_id)
                .bind(active_only)
                .fetch_all(&state.pool)
                .await
                .storage("list values")?;
                rows.into_iter().map(ListValue::try_from).collect()
            })
            .await
    }

    /// Label of a stored key. Inactive values still resolve.
    pub async fn resolve_label(state: &AppState, list_id: i64, value_id: i64) -> Result<String, AppError> {
        let value = Self::load_value(state, value_id).await?;
        if value.list_id != list_id {
            return Err(AppError::NotFound(format!("value {} in list {}", value_id, list_id)));
        }
        Ok(value.label)
    }

    pub async fn rename_value(
        state: &AppState,
        actor: &Actor,
        value_id: i64,
        label: &str,
    ) -> Result<(), AppError> {
        PermissionGate::require_administrator(state, actor, "rename list value").await?;
        let label = clean_name("list value label", label)?;
        let current = Self::load_value(state, value_id).await?;
        let list = Self::load_list(state, current.list_id).await?;
        state
            .bounded("rename list value", async {
                let values = state.sys_table(LIST_VALUES_TABLE);
                let taken: bool = sqlx::query_scalar(&format!(
                    "SELECT EXISTS(SELECT 1 FROM {} WHERE list_id = $1 AND id <> $2 AND lower(label) = lower($3))",
                    values
                ))
                .bind(current.list_id)
                .bind(value_id)
                .bind(&label)
                .fetch_one(&state.pool)
                .await
                .storage("rename list value")?;
                if taken {
                    return Err(AppError::Conflict(format!(
                        "list '{}' already has value '{}'",
                        list.name, label
                    )));
                }
                sqlx::query(&format!("UPDATE {} SET label = $1 WHERE id = $2", values))
                    .bind(&label)
                    .bind(value_id)
                    .execute(&state.pool)
                    .await
                    .storage("rename list value")?;
                Ok(())
            })
            .await?;
        AuditRecorder::record(
            state,
            actor,
            AuditAction::Modify,
            &format!("List: {}", list.name),
            &format!("Value Id: {}; renamed", value_id),
        )
        .await;
        Ok(())
    }

    /// Deactivate or reactivate a value. Stored keys keep resolving either way.
    pub async fn set_value_state(
        state: &AppState,
        actor: &Actor,
        value_id: i64,
        new_state: Status,
    ) -> Result<(), AppError> {
        PermissionGate::require_administrator(state, actor, "change list value").await?;
        let current = Self::load_value(state, value_id).await?;
        let list = Self::load_list(state, current.list_id).await?;
        state
            .bounded("set list value state", async {
                sqlx::query(&format!(
                    "UPDATE {} SET state = $1 WHERE id = $2",
                    state.sys_table(LIST_VALUES_TABLE)
                ))
                .bind(new_state.as_str())
                .bind(value_id)
                .execute(&state.pool)
                .await
                .storage("set list value state")?;
                Ok(())
            })
            .await?;
        AuditRecorder::record(
            state,
            actor,
            AuditAction::Modify,
            &format!("List: {}", list.name),
            &format!("Value Id: {}, State: {}", value_id, new_state.as_str()),
        )
        .await;
        Ok(())
    }

    /// Remove a list and its values. Conflict while any field (active or not) references it.
    pub async fn delete_list(state: &AppState, actor: &Actor, list_id: i64) -> Result<(), AppError> {
        PermissionGate::require_administrator(state, actor, "delete list").await?;
        let name = state
            .bounded("delete list", async {
                let mut tx = state.pool.begin().await.storage("delete list")?;
                let lists = state.sys_table(LISTS_TABLE);
                let name: Option<String> = sqlx::query_scalar(&format!(
                    "SELECT name FROM {} WHERE id = $1 FOR UPDATE",
                    lists
                ))
                .bind(list_id)
                .fetch_optional(&mut *tx)
                .await
                .storage("delete list")?;
                let name = name.ok_or_else(|| AppError::NotFound(format!("list {}", list_id)))?;
                let references: i64 = sqlx::query_scalar(&format!(
                    "SELECT COUNT(*) FROM {} WHERE list_id = $1",
                    state.sys_table(FIELDS_TABLE)
                ))
                .bind(list_id)
                .fetch_one(&mut *tx)
                .await
                .storage("delete list")?;
                if references > 0 {
                    return Err(AppError::Conflict(format!(
                        "list '{}' is used by {} field(s)",
                        name, references
                    )));
                }
                sqlx::query(&format!("DELETE FROM {} WHERE id = $1", lists))
                    .bind(list_id)
                    .execute(&mut *tx)
                    .await
                    .storage("delete list")?;
                tx.commit().await.storage("delete list")?;
                Ok(name)
            })
            .await?;
        tracing::info!(list = %name, id = list_id, "list deleted");
        AuditRecorder::record(state, actor, AuditAction::Delete, &format!("List: {}", name), &format!("Id: {}", list_id)).await;
        Ok(())
    }

    /// Validation error unless `value_id` is an active value of `list_id`.
    pub(crate) async fn ensure_value_in_list(
        state: &AppState,
        field: &str,
        list_id: i64,
        value_id: i64,
    ) -> Result<(), AppError> {
        let ok: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1 AND list_id = $2 AND state = 'Active')",
            state.sys_table(LIST_VALUES_TABLE)
        ))
        .bind(value_id)
        .bind(list_id)
        .fetch_one(&state.pool)
        .await
        .storage("check list value")?;
        if ok {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "{}: {} is not an active value of its list",
                field, value_id
            )))
        }
    }

    async fn load_list(state: &AppState, list_id: i64) -> Result<List, AppError> {
        state
            .bounded("get list", async {
                let row: Option<ListRow> = sqlx::query_as(&format!(
                    "SELECT id, name, description, state FROM {} WHERE id = $1",
                    state.sys_table(LISTS_TABLE)
                ))
                .bind(list_id)
                .fetch_optional(&state.pool)
                .await
                .storage("get list")?;
                row.ok_or_else(|| AppError::NotFound(format!("list {}", list_id)))?
                    .try_into()
            })
            .await
    }

    async fn load_value(state: &AppState, value_id: i64) -> Result<ListValue, AppError> {
        state
            .bounded("get list value", async {
                let row: Option<ValueRow> = sqlx::query_as(&format!(
                    "SELECT id, list_id, label, sort_order, state FROM {} WHERE id = $1",
                    state.sys_table(LIST_VALUES_TABLE)
                ))
                .bind(value_id)
                .fetch_optional(&state.pool)
                .await
                .storage("get list value")?;
                row.ok_or_else(|| AppError::NotFound(format!("list value {}", value_id)))?
                    .try_into()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("label", "  High  ").unwrap(), "High");
        assert!(matches!(clean_name("label", "   "), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_duplicate_labels_conflict() {
        let labels = vec!["Low".to_string(), "High".to_string(), "low".to_string()];
        assert!(matches!(check_unique_labels(&labels), Err(AppError::Conflict(_))));
        assert!(check_unique_labels(&labels[..2]).is_ok());
    }

    #[test]
    fn test_new_list_defaults() {
        let new: NewList = serde_json::from_value(serde_json::json!({"name": "Priority"})).unwrap();
        assert!(new.values.is_empty());
        assert!(new.description.is_none());
    }
}
