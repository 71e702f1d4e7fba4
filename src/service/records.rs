//! Record operations on dynamic module tables.
//!
//! Each call re-reads the module from the catalog, checks the actor's permission,
//! validates the payload, runs the generated statement and, for mutations, appends
//! an audit entry.

use crate::actor::Actor;
use crate::audit::{AuditAction, AuditRecorder};
use crate::catalog::{FieldDefinition, ModuleCatalog, ModuleKind, ResolvedModule};
use crate::document::{DocumentStore, Upload};
use crate::error::{AppError, StorageContext};
use crate::lists::ListRegistry;
use crate::permission::{Capability, PermissionGate};
use crate::service::validation::PayloadValidator;
use crate::sql::rows::{cell_to_value, row_to_json};
use crate::sql::{self, bind_all, BindValue, QueryBuf};
use crate::state::AppState;
use crate::types::{is_empty, DataType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::Row;

/// How ListRef columns come back from a single-record read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum ReadMode {
    /// Stored keys, suitable for editing and round trips.
    Raw,
    /// ListRef keys replaced by their labels.
    #[default]
    Display,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupCount {
    pub value: Value,
    pub total: i64,
}

pub struct RecordService;

impl RecordService {
    /// Active records, newest first. Secondary modules may be narrowed to one parent record.
    pub async fn list(
        state: &AppState,
        actor: &Actor,
        module_id: i64,
        query: &ListQuery,
    ) -> Result<Vec<Value>, AppError> {
        let module = Self::authorized(state, actor, module_id, Capability::View).await?;
        if query.parent_id.is_some() && !module.is_secondary() {
            return Err(AppError::Validation(format!(
                "{} has no parent module to filter by",
                module.module.name
            )));
        }
        let limit = state.config.effective_list_limit(query.limit);
        let q = sql::select_list(&module, query.parent_id, limit, query.offset.unwrap_or(0));
        Self::fetch_many(state, &module, "list records", &q).await
    }

    /// One record by id, whatever its state.
    pub async fn read(
        state: &AppState,
        actor: &Actor,
        module_id: i64,
        id: i64,
        mode: ReadMode,
    ) -> Result<Value, AppError> {
        let module = Self::authorized(state, actor, module_id, Capability::View).await?;
        Self::read_resolved(state, &module, id, mode).await
    }

    /// Insert a record and return its id.
    pub async fn create(
        state: &AppState,
        actor: &Actor,
        module_id: i64,
        parent_id: Option<i64>,
        payload: &Map<String, Value>,
    ) -> Result<i64, AppError> {
        let module = Self::authorized(state, actor, module_id, Capability::Add).await?;
        if parent_id.is_some() && !module.is_secondary() {
            return Err(AppError::Validation(format!(
                "{} records have no parent",
                module.module.name
            )));
        }
        let values = PayloadValidator::for_insert(&module, payload)?;
        Self::check_list_values(state, &values).await?;
        if let (Some(parent), Some(pid)) = (&module.parent, parent_id) {
            let q = sql::exists_active(&crate::ident::qualified(&module.schema, &parent.table_name), pid);
            if !Self::fetch_flag(state, "check parent record", &q).await? {
                return Err(AppError::NotFound(format!("{} record {}", parent.module_name, pid)));
            }
        }
        let q = sql::insert(&module, &values, parent_id, actor.id)?;
        tracing::debug!(sql = %q.sql, params = q.params.len(), "insert record");
        let id = state
            .bounded("insert record", async {
                let row = bind_all(sqlx::query(&q.sql), &q.params)
                    .fetch_one(&state.pool)
                    .await
                    .storage("insert record")?;
                row.try_get::<i64, _>(0).storage("insert record")
            })
            .await?;
        AuditRecorder::record(state, actor, AuditAction::Add, &module.process_label(), &format!("Id: {}", id)).await;
        Ok(id)
    }

    /// Partial update of an active record: only supplied fields change.
    pub async fn update(
        state: &AppState,
        actor: &Actor,
        module_id: i64,
        id: i64,
        payload: &Map<String, Value>,
    ) -> Result<(), AppError> {
        let module = Self::authorized(state, actor, module_id, Capability::Modify).await?;
        Self::update_resolved(state, actor, &module, id, payload).await
    }

    /// Soft delete: the row stays with State Inactive.
    pub async fn delete(state: &AppState, actor: &Actor, module_id: i64, id: i64) -> Result<(), AppError> {
        let module = Self::authorized(state, actor, module_id, Capability::Delete).await?;
        let q = sql::soft_delete(&module, id, actor.id);
        if !Self::execute_returning(state, "delete record", &q).await? {
            return Err(AppError::NotFound(format!("active {} record {}", module.module.name, id)));
        }
        AuditRecorder::record(state, actor, AuditAction::Delete, &module.process_label(), &format!("Id: {}", id)).await;
        Ok(())
    }

    /// Active record counts per value of one field, largest first. Principal modules only.
    pub async fn grouped(
        state: &AppState,
        actor: &Actor,
        module_id: i64,
        field_name: &str,
    ) -> Result<Vec<GroupCount>, AppError> {
        let module = Self::authorized(state, actor, module_id, Capability::ViewGrouped).await?;
        if module.module.kind != ModuleKind::Principal {
            return Err(AppError::Validation(format!(
                "grouped view is only available for principal modules; {} is {}",
                module.module.name,
                module.module.kind.as_str()
            )));
        }
        let field = Self::field(&module, field_name)?;
        let q = sql::select_grouped(&module, field);
        tracing::debug!(sql = %q.sql, params = q.params.len(), "grouped records");
        state
            .bounded("grouped records", async {
                let rows = bind_all(sqlx::query(&q.sql), &q.params)
                    .fetch_all(&state.pool)
                    .await
                    .storage("grouped records")?;
                rows.iter()
                    .map(|row| {
                        Ok(GroupCount {
                            value: cell_to_value(row, 0),
                            total: row.try_get::<i64, _>(1).storage("grouped records")?,
                        })
                    })
                    .collect::<Result<Vec<_>, AppError>>()
            })
            .await
    }

    /// Active records where one field equals `value`, capped at the detail limit.
    pub async fn filtered(
        state: &AppState,
        actor: &Actor,
        module_id: i64,
        field_name: &str,
        value: &Value,
        limit: Option<u32>,
    ) -> Result<Vec<Value>, AppError> {
        let module = Self::authorized(state, actor, module_id, Capability::View).await?;
        let field = Self::field(&module, field_name)?;
        if is_empty(value) {
            return Err(AppError::Validation(format!("a value for {} is required", field.name)));
        }
        let bound = field.data_type.coerce(&field.name, value)?;
        let limit = state.config.effective_detail_limit(limit);
        let q = sql::select_filtered(&module, field, bound, limit);
        Self::fetch_many(state, &module, "filtered records", &q).await
    }

    /// Upload a file and store its document id in a FileRef field. No transaction is
    /// open while the document store works.
    pub async fn attach_document(
        state: &AppState,
        actor: &Actor,
        documents: &dyn DocumentStore,
        module_id: i64,
        id: i64,
        field_name: &str,
        upload: Upload,
    ) -> Result<String, AppError> {
        let module = Self::authorized(state, actor, module_id, Capability::Modify).await?;
        let field = Self::file_field(&module, field_name)?;
        let field_name = field.name.clone();
        let table = module.table();
        if !Self::fetch_flag(state, "check record", &sql::exists_active(&table, id)).await? {
            return Err(AppError::NotFound(format!("active {} record {}", module.module.name, id)));
        }
        let filename = upload.filename.clone();
        let document_id = documents.upload(upload, &module.module.name).await?;
        tracing::info!(module = %module.module.name, record = id, field = %field_name, file = %filename, "document uploaded");
        let mut payload = Map::new();
        payload.insert(field_name, Value::String(document_id.clone()));
        Self::update_resolved(state, actor, &module, id, &payload).await?;
        Ok(document_id)
    }

    /// Viewer URL for the document stored in a FileRef field.
    pub async fn document_url(
        state: &AppState,
        actor: &Actor,
        documents: &dyn DocumentStore,
        module_id: i64,
        id: i64,
        field_name: &str,
    ) -> Result<String, AppError> {
        let module = Self::authorized(state, actor, module_id, Capability::View).await?;
        let field = Self::file_field(&module, field_name)?;
        let record = Self::read_resolved(state, &module, id, ReadMode::Raw).await?;
        let document_id = record
            .get(&field.name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::NotFound(format!("no document in {} of record {}", field.name, id)))?;
        documents.viewer_url(document_id).await
    }

    async fn authorized(
        state: &AppState,
        actor: &Actor,
        module_id: i64,
        capability: Capability,
    ) -> Result<ResolvedModule, AppError> {
        let module = ModuleCatalog::resolve(state, module_id).await?;
        PermissionGate::require(state, actor, module.module.id, &module.module.name, capability).await?;
        Ok(module)
    }

    async fn read_resolved(
        state: &AppState,
        module: &ResolvedModule,
        id: i64,
        mode: ReadMode,
    ) -> Result<Value, AppError> {
        let q = sql::select_by_id(module, id, mode == ReadMode::Display);
        tracing::debug!(sql = %q.sql, params = q.params.len(), "read record");
        let row = state
            .bounded("read record", async {
                bind_all(sqlx::query(&q.sql), &q.params)
                    .fetch_optional(&state.pool)
                    .await
                    .storage("read record")
            })
            .await?;
        row.map(|r| row_to_json(&r, |c| module.record_key(c)))
            .ok_or_else(|| AppError::NotFound(format!("{} record {}", module.module.name, id)))
    }

    async fn update_resolved(
        state: &AppState,
        actor: &Actor,
        module: &ResolvedModule,
        id: i64,
        payload: &Map<String, Value>,
    ) -> Result<(), AppError> {
        let values = PayloadValidator::for_update(module, payload)?;
        Self::check_list_values(state, &values).await?;
        let q = sql::update(module, id, &values, actor.id);
        if !Self::execute_returning(state, "update record", &q).await? {
            return Err(AppError::NotFound(format!("active {} record {}", module.module.name, id)));
        }
        let changed: Vec<&str> = values.iter().map(|(f, _)| f.name.as_str()).collect();
        AuditRecorder::record(
            state,
            actor,
            AuditAction::Modify,
            &module.process_label(),
            &format!("Id: {}; fields: {}", id, changed.join(", ")),
        )
        .await;
        Ok(())
    }

    /// ListRef values must be active members of the field's list.
    async fn check_list_values(state: &AppState, values: &[(&FieldDefinition, BindValue)]) -> Result<(), AppError> {
        for (field, value) in values {
            if let (DataType::ListRef { list_id }, BindValue::Int(key)) = (&field.data_type, value) {
                state
                    .bounded("check list value", ListRegistry::ensure_value_in_list(state, &field.name, *list_id, *key))
                    .await?;
            }
        }
        Ok(())
    }

    fn field<'m>(module: &'m ResolvedModule, name: &str) -> Result<&'m FieldDefinition, AppError> {
        module
            .field(name)
            .ok_or_else(|| AppError::NotFound(format!("field {} in {}", name, module.module.name)))
    }

    fn file_field<'m>(module: &'m ResolvedModule, name: &str) -> Result<&'m FieldDefinition, AppError> {
        let field = Self::field(module, name)?;
        if field.data_type != DataType::FileRef {
            return Err(AppError::Validation(format!("{} is not a file field", field.name)));
        }
        Ok(field)
    }

    async fn fetch_many(
        state: &AppState,
        module: &ResolvedModule,
        operation: &str,
        q: &QueryBuf,
    ) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = q.params.len(), "{}", operation);
        state
            .bounded(operation, async {
                let rows = bind_all(sqlx::query(&q.sql), &q.params)
                    .fetch_all(&state.pool)
                    .await
                    .storage(operation)?;
                Ok(rows
                    .iter()
                    .map(|r| row_to_json(r, |c| module.record_key(c)))
                    .collect())
            })
            .await
    }

    async fn fetch_flag(state: &AppState, operation: &str, q: &QueryBuf) -> Result<bool, AppError> {
        tracing::debug!(sql = %q.sql, params = q.params.len(), "{}", operation);
        state
            .bounded(operation, async {
                let row = bind_all(sqlx::query(&q.sql), &q.params)
                    .fetch_one(&state.pool)
                    .await
                    .storage(operation)?;
                row.try_get::<bool, _>(0).storage(operation)
            })
            .await
    }

    /// Run a statement with RETURNING; true when a row came back.
    async fn execute_returning(state: &AppState, operation: &str, q: &QueryBuf) -> Result<bool, AppError> {
        tracing::debug!(sql = %q.sql, params = q.params.len(), "{}", operation);
        state
            .bounded(operation, async {
                let row = bind_all(sqlx::query(&q.sql), &q.params)
                    .fetch_optional(&state.pool)
                    .await
                    .storage(operation)?;
                Ok(row.is_some())
            })
            .await
    }
}
