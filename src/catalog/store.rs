//! Module catalog: module and field rows plus the physical tables they describe.
//!
//! Every definition change writes metadata and runs its DDL in one transaction, so a
//! module row is never visible without its table in the matching shape.

use crate::actor::Actor;
use crate::audit::{AuditAction, AuditRecorder};
use crate::catalog::resolved::{ParentLink, ResolvedModule};
use crate::catalog::types::{
    FieldDefinition, FieldSpec, FieldView, Module, ModuleDetail, ModuleFilter, ModuleKind,
    ModuleSpec, Status,
};
use crate::catalog::validator::{validate_fields, validate_header};
use crate::error::{conflict_on_unique, AppError, StorageContext};
use crate::ident::{parent_fk_column, qualified, table_name};
use crate::migration::{self, SchemaChange};
use crate::permission::PermissionGate;
use crate::sql::params::{bind_all_as, BindValue};
use crate::sql::{count_rows, ddl, QueryBuf};
use crate::state::AppState;
use crate::store::{FIELDS_TABLE, LISTS_TABLE, MODULES_TABLE};
use crate::types::DataType;
use sqlx::PgConnection;
use std::collections::HashSet;

const MODULE_COLUMNS: &str =
    "id, name, table_name, kind, parent_module_id, icon, display_order, state";

#[derive(sqlx::FromRow)]
struct ModuleRow {
    id: i64,
    name: String,
    table_name: String,
    kind: String,
    parent_module_id: Option<i64>,
    icon: Option<String>,
    display_order: i32,
    state: String,
}

impl TryFrom<ModuleRow> for Module {
    type Error = AppError;

    fn try_from(r: ModuleRow) -> Result<Self, Self::Error> {
        Ok(Module {
            id: r.id,
            name: r.name,
            table_name: r.table_name,
            kind: r.kind.parse()?,
            parent_module_id: r.parent_module_id,
            icon: r.icon,
            display_order: r.display_order,
            state: r.state.parse()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FieldRow {
    id: i64,
    module_id: i64,
    name: String,
    column_name: String,
    data_type: String,
    text_length: Option<i32>,
    list_id: Option<i64>,
    sort_order: i32,
    visible: bool,
    visible_in_grid: bool,
    required: bool,
    state: String,
    list_name: Option<String>,
}

impl FieldRow {
    fn into_view(self) -> Result<FieldView, AppError> {
        let list_name = self.list_name.clone();
        Ok(FieldView {
            field: self.try_into()?,
            list_name,
        })
    }
}

impl TryFrom<FieldRow> for FieldDefinition {
    type Error = AppError;

    fn try_from(r: FieldRow) -> Result<Self, Self::Error> {
        Ok(FieldDefinition {
            id: r.id,
            module_id: r.module_id,
            data_type: DataType::from_parts(&r.data_type, r.text_length, r.list_id)?,
            name: r.name,
            column_name: r.column_name,
            order: r.sort_order,
            visible: r.visible,
            visible_in_grid: r.visible_in_grid,
            required: r.required,
            state: r.state.parse()?,
        })
    }
}

fn field_select(state: &AppState) -> String {
    format!(
        "SELECT f.id, f.module_id, f.name, f.column_name, f.data_type, f.text_length, f.list_id, \
         f.sort_order, f.visible, f.visible_in_grid, f.required, f.state, l.name AS list_name \
         FROM {} f LEFT JOIN {} l ON l.id = f.list_id",
        state.sys_table(FIELDS_TABLE),
        state.sys_table(LISTS_TABLE)
    )
}

/// SELECT for `ListModules`. Values are bound; ordering is display order then name.
pub(crate) fn build_module_query(table: &str, filter: &ModuleFilter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut conds: Vec<String> = Vec::new();
    if let Some(kind) = filter.kind {
        let ph = q.push_param(BindValue::Text(kind.as_str().to_string()));
        conds.push(format!("kind = {}", ph));
    }
    if let Some(st) = filter.state {
        let ph = q.push_param(BindValue::Text(st.as_str().to_string()));
        conds.push(format!("state = {}", ph));
    }
    if let Some(parent) = filter.parent_module_id {
        let ph = q.push_param(BindValue::Int(parent));
        conds.push(format!("parent_module_id = {}", ph));
    }
    if let Some(text) = filter.name_contains.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let ph = q.push_param(BindValue::Text(text.to_string()));
        conds.push(format!("strpos(lower(name), lower({})) > 0", ph));
    }
    let where_clause = if conds.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conds.join(" AND "))
    };
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY display_order, name",
        MODULE_COLUMNS, table, where_clause
    );
    q
}

pub struct ModuleCatalog;

impl ModuleCatalog {
    /// Persist a module with its fields and create its table. Returns the module id.
    pub async fn create_module(state: &AppState, actor: &Actor, spec: ModuleSpec) -> Result<i64, AppError> {
        PermissionGate::require_administrator(state, actor, "create module").await?;
        validate_header(&spec)?;
        let name = spec.name.trim().to_string();
        let table = table_name(&name);
        let id = state
            .bounded("create module", async {
                let mut tx = state.pool.begin().await.storage("create module")?;
                Self::check_name_free(&mut tx, state, &name, &table, None).await?;
                let parent = match spec.parent_module_id {
                    Some(pid) => Some(Self::principal_parent(&mut tx, state, pid).await?),
                    None => None,
                };
                validate_fields(&spec.fields, parent.as_ref().map(|p| p.fk_column.as_str()))?;
                Self::check_lists(&mut tx, state, spec.fields.iter()).await?;

                let id: i64 = sqlx::query_scalar(&format!(
                    "INSERT INTO {} (name, table_name, kind, parent_module_id, icon, display_order, state) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
                    state.sys_table(MODULES_TABLE)
                ))
                .bind(&name)
                .bind(&table)
                .bind(spec.kind.as_str())
                .bind(spec.parent_module_id)
                .bind(&spec.icon)
                .bind(spec.display_order)
                .bind(spec.state.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(conflict_on_unique("create module", format!("module '{}' already exists", name)))?;

                let plan = migration::reconcile(id, &[], &spec.fields)?;
                let mut fields = Vec::with_capacity(plan.fields.len());
                for planned in &plan.fields {
                    let mut def = planned.definition.clone();
                    def.id = Self::insert_field(&mut tx, state, &def).await?;
                    fields.push(def);
                }
                let statement = ddl::create_table(state.schema(), &table, parent.as_ref(), &fields);
                migration::apply(&mut tx, "create module", &[statement]).await?;
                tx.commit().await.storage("create module")?;
                Ok(id)
            })
            .await?;
        tracing::info!(module = %name, id, table = %table, kind = spec.kind.as_str(), "module created");
        AuditRecorder::record(state, actor, AuditAction::Add, &format!("Module: {}", name), &format!("Id: {}", id)).await;
        Ok(id)
    }

    /// Apply a new definition. Kind and parent are fixed after creation. Renames move the
    /// table (and child FK columns); field changes are additive only.
    pub async fn update_module(
        state: &AppState,
        actor: &Actor,
        module_id: i64,
        spec: ModuleSpec,
    ) -> Result<(), AppError> {
        PermissionGate::require_administrator(state, actor, "update module").await?;
        validate_header(&spec)?;
        let name = spec.name.trim().to_string();
        let (old_name, statements) = state
            .bounded("update module", async {
                let mut tx = state.pool.begin().await.storage("update module")?;
                let current = Self::lock_module(&mut tx, state, module_id).await?;
                if current.kind != spec.kind || current.parent_module_id != spec.parent_module_id {
                    return Err(AppError::Validation(format!(
                        "module '{}': kind and parent cannot change after creation",
                        current.name
                    )));
                }
                let new_table = table_name(&name);
                Self::check_name_free(&mut tx, state, &name, &new_table, Some(module_id)).await?;

                let parent = match current.parent_module_id {
                    Some(pid) => Some(Self::parent_link(&mut tx, state, pid).await?),
                    None => None,
                };
                validate_fields(&spec.fields, parent.as_ref().map(|p| p.fk_column.as_str()))?;
                let previous = Self::fields_for_update(&mut tx, state, module_id).await?;
                let plan = migration::reconcile(module_id, &previous, &spec.fields)?;
                let added: HashSet<&str> = plan
                    .changes
                    .iter()
                    .filter_map(|c| match c {
                        SchemaChange::AddColumn(f) => Some(f.column_name.as_str()),
                        SchemaChange::WidenColumn { .. } => None,
                    })
                    .collect();
                Self::check_lists(
                    &mut tx,
                    state,
                    spec.fields
                        .iter()
                        .filter(|f| added.contains(crate::ident::column_name(&f.name).as_str())),
                )
                .await?;

                let mut statements = Vec::new();
                if new_table != current.table_name {
                    statements.push(ddl::rename_table(state.schema(), &current.table_name, &new_table));
                    let children: Vec<String> = sqlx::query_scalar(&format!(
                        "SELECT table_name FROM {} WHERE parent_module_id = $1 ORDER BY id",
                        state.sys_table(MODULES_TABLE)
                    ))
                    .bind(module_id)
                    .fetch_all(&mut *tx)
                    .await
                    .storage("update module")?;
                    let old_fk = parent_fk_column(&current.table_name);
                    let new_fk = parent_fk_column(&new_table);
                    for child in children {
                        statements.push(ddl::rename_column(state.schema(), &child, &old_fk, &new_fk));
                    }
                }
                statements.extend(plan.statements(state.schema(), &new_table));

                sqlx::query(&format!(
                    "UPDATE {} SET name = $1, table_name = $2, icon = $3, display_order = $4, state = $5, \
                     modified_at = NOW() WHERE id = $6",
                    state.sys_table(MODULES_TABLE)
                ))
                .bind(&name)
                .bind(&new_table)
                .bind(&spec.icon)
                .bind(spec.display_order)
                .bind(spec.state.as_str())
                .bind(module_id)
                .execute(&mut *tx)
                .await
                .map_err(conflict_on_unique("update module", format!("module '{}' already exists", name)))?;

                for planned in &plan.fields {
                    if planned.existing_id.is_some() {
                        Self::update_field(&mut tx, state, &planned.definition).await?;
                    } else {
                        Self::insert_field(&mut tx, state, &planned.definition).await?;
                    }
                }
                if !plan.retired.is_empty() {
                    sqlx::query(&format!(
                        "UPDATE {} SET state = 'Inactive' WHERE id = ANY($1)",
                        state.sys_table(FIELDS_TABLE)
                    ))
                    .bind(&plan.retired)
                    .execute(&mut *tx)
                    .await
                    .storage("update module")?;
                }
                migration::apply(&mut tx, "update module", &statements).await?;
                tx.commit().await.storage("update module")?;
                Ok((current.name, statements))
            })
            .await?;
        tracing::info!(module = %name, id = module_id, ddl = statements.len(), "module updated");
        let detail = if old_name == name {
            format!("Id: {}", module_id)
        } else {
            format!("Id: {}, renamed from '{}'", module_id, old_name)
        };
        AuditRecorder::record(state, actor, AuditAction::Modify, &format!("Module: {}", name), &detail).await;
        Ok(())
    }

    /// Drop the table and the metadata together. Conflict while the table has rows
    /// or another module names this one as parent.
    pub async fn delete_module(state: &AppState, actor: &Actor, module_id: i64) -> Result<(), AppError> {
        PermissionGate::require_administrator(state, actor, "delete module").await?;
        let module = state
            .bounded("delete module", async {
                let mut tx = state.pool.begin().await.storage("delete module")?;
                let module = Self::lock_module(&mut tx, state, module_id).await?;
                let children: i64 = sqlx::query_scalar(&format!(
                    "SELECT COUNT(*) FROM {} WHERE parent_module_id = $1",
                    state.sys_table(MODULES_TABLE)
                ))
                .bind(module_id)
                .fetch_one(&mut *tx)
                .await
                .storage("delete module")?;
                if children > 0 {
                    return Err(AppError::Conflict(format!(
                        "module '{}' is the parent of {} module(s)",
                        module.name, children
                    )));
                }
                let table = qualified(state.schema(), &module.table_name);
                let rows: i64 = sqlx::query_scalar(&count_rows(&table))
                    .fetch_one(&mut *tx)
                    .await
                    .storage("delete module")?;
                if rows > 0 {
                    return Err(AppError::Conflict(format!(
                        "module '{}' still has {} record(s)",
                        module.name, rows
                    )));
                }
                migration::apply(
                    &mut tx,
                    "delete module",
                    &[ddl::drop_table(state.schema(), &module.table_name)],
                )
                .await?;
                sqlx::query(&format!("DELETE FROM {} WHERE id = $1", state.sys_table(MODULES_TABLE)))
                    .bind(module_id)
                    .execute(&mut *tx)
                    .await
                    .storage("delete module")?;
                tx.commit().await.storage("delete module")?;
                Ok(module)
            })
            .await?;
        tracing::info!(module = %module.name, id = module_id, table = %module.table_name, "module deleted");
        AuditRecorder::record(
            state,
            actor,
            AuditAction::Delete,
            &format!("Module: {}", module.name),
            &format!("Id: {}", module_id),
        )
        .await;
        Ok(())
    }

    pub async fn get_module(state: &AppState, module_id: i64) -> Result<ModuleDetail, AppError> {
        let module = Self::load_module(state, module_id).await?;
        let fields = Self::get_fields_of(state, module_id).await?;
        Ok(ModuleDetail { module, fields })
    }

    /// Active fields in display order, with list names resolved.
    pub async fn get_fields_of(state: &AppState, module_id: i64) -> Result<Vec<FieldView>, AppError> {
        state
            .bounded("get fields", async {
                let rows: Vec<FieldRow> = sqlx::query_as(&format!(
                    "{} WHERE f.module_id = $1 AND f.state = 'Active' ORDER BY f.sort_order, f.id",
                    field_select(state)
                ))
                .bind(module_id)
                .fetch_all(&state.pool)
                .await
                .storage("get fields")?;
                rows.into_iter().map(FieldRow::into_view).collect()
            })
            .await
    }

    pub async fn list_modules(state: &AppState, filter: &ModuleFilter) -> Result<Vec<Module>, AppError> {
        let q = build_module_query(&state.sys_table(MODULES_TABLE), filter);
        tracing::debug!(sql = %q.sql, params = q.params.len(), "list modules");
        state
            .bounded("list modules", async {
                let rows: Vec<ModuleRow> = bind_all_as(sqlx::query_as(&q.sql), &q.params)
                    .fetch_all(&state.pool)
                    .await
                    .storage("list modules")?;
                rows.into_iter().map(Module::try_from).collect()
            })
            .await
    }

    /// Fresh read of an active module, its parent link and active fields, for record work.
    pub async fn resolve(state: &AppState, module_id: i64) -> Result<ResolvedModule, AppError> {
        state
            .bounded("resolve module", async {
                let mut conn = state.pool.acquire().await.storage("resolve module")?;
                let module = Self::fetch_module(&mut conn, state, module_id, false).await?;
                if module.state != Status::Active {
                    return Err(AppError::NotFound(format!("module {} is inactive", module.name)));
                }
                let parent = match module.parent_module_id {
                    Some(pid) => Some(Self::parent_link(&mut conn, state, pid).await?),
                    None => None,
                };
                let rows: Vec<FieldRow> = sqlx::query_as(&format!(
                    "{} WHERE f.module_id = $1 AND f.state = 'Active' ORDER BY f.sort_order, f.id",
                    field_select(state)
                ))
                .bind(module_id)
                .fetch_all(&mut *conn)
                .await
                .storage("resolve module")?;
                let fields = rows
                    .into_iter()
                    .map(FieldDefinition::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ResolvedModule {
                    schema: state.schema().to_string(),
                    module,
                    parent,
                    fields,
                })
            })
            .await
    }

    async fn load_module(state: &AppState, module_id: i64) -> Result<Module, AppError> {
        state
            .bounded("get module", async {
                let mut conn = state.pool.acquire().await.storage("get module")?;
                Self::fetch_module(&mut conn, state, module_id, false).await
            })
            .await
    }

    async fn lock_module(conn: &mut PgConnection, state: &AppState, module_id: i64) -> Result<Module, AppError> {
        Self::fetch_module(conn, state, module_id, true).await
    }

    async fn fetch_module(
        conn: &mut PgConnection,
        state: &AppState,
        module_id: i64,
        for_update: bool,
    ) -> Result<Module, AppError> {
        let row: Option<ModuleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE id = $1{}",
            MODULE_COLUMNS,
            state.sys_table(MODULES_TABLE),
            if for_update { " FOR UPDATE" } else { "" }
        ))
        .bind(module_id)
        .fetch_optional(&mut *conn)
        .await
        .storage("get module")?;
        row.ok_or_else(|| AppError::NotFound(format!("module {}", module_id)))?
            .try_into()
    }

    async fn parent_link(conn: &mut PgConnection, state: &AppState, parent_id: i64) -> Result<ParentLink, AppError> {
        let parent = Self::fetch_module(conn, state, parent_id, false).await?;
        Ok(ParentLink {
            module_id: parent.id,
            fk_column: parent_fk_column(&parent.table_name),
            module_name: parent.name,
            table_name: parent.table_name,
        })
    }

    /// Parent for a new Secondary module. Locked so it cannot be renamed or dropped meanwhile.
    async fn principal_parent(conn: &mut PgConnection, state: &AppState, parent_id: i64) -> Result<ParentLink, AppError> {
        let parent = match Self::fetch_module(conn, state, parent_id, true).await {
            Err(AppError::NotFound(_)) => {
                return Err(AppError::Validation(format!("parent module {} does not exist", parent_id)))
            }
            other => other?,
        };
        if parent.kind != ModuleKind::Principal {
            return Err(AppError::Validation(format!(
                "parent module '{}' is {}, not Principal",
                parent.name,
                parent.kind.as_str()
            )));
        }
        Ok(ParentLink {
            module_id: parent.id,
            fk_column: parent_fk_column(&parent.table_name),
            module_name: parent.name,
            table_name: parent.table_name,
        })
    }

    /// Conflict when another module already uses the name or the derived table name.
    async fn check_name_free(
        conn: &mut PgConnection,
        state: &AppState,
        name: &str,
        table: &str,
        except: Option<i64>,
    ) -> Result<(), AppError> {
        let clash: Option<String> = sqlx::query_scalar(&format!(
            "SELECT name FROM {} WHERE (lower(name) = lower($1) OR table_name = $2) \
             AND id IS DISTINCT FROM $3 LIMIT 1",
            state.sys_table(MODULES_TABLE)
        ))
        .bind(name)
        .bind(table)
        .bind(except)
        .fetch_optional(&mut *conn)
        .await
        .storage("check module name")?;
        match clash {
            Some(other) if other.to_lowercase() == name.to_lowercase() => {
                Err(AppError::Conflict(format!("module '{}' already exists", name)))
            }
            Some(other) => Err(AppError::Conflict(format!(
                "module '{}' maps to table {} already used by '{}'",
                name, table, other
            ))),
            None => Ok(()),
        }
    }

    /// Every referenced list must exist and be active.
    async fn check_lists<'a>(
        conn: &mut PgConnection,
        state: &AppState,
        fields: impl Iterator<Item = &'a FieldSpec>,
    ) -> Result<(), AppError> {
        let mut wanted: Vec<i64> = fields.filter_map(|f| f.data_type.list_id()).collect();
        if wanted.is_empty() {
            return Ok(());
        }
        wanted.sort_unstable();
        wanted.dedup();
        let found: Vec<i64> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE id = ANY($1) AND state = 'Active'",
            state.sys_table(LISTS_TABLE)
        ))
        .bind(&wanted)
        .fetch_all(&mut *conn)
        .await
        .storage("check lists")?;
        match wanted.iter().find(|id| !found.contains(id)) {
            Some(missing) => Err(AppError::Validation(format!(
                "list {} does not exist or is inactive",
                missing
            ))),
            None => Ok(()),
        }
    }

    /// All fields of a module, inactive included, locked for the update.
    async fn fields_for_update(
        conn: &mut PgConnection,
        state: &AppState,
        module_id: i64,
    ) -> Result<Vec<FieldDefinition>, AppError> {
        let rows: Vec<FieldRow> = sqlx::query_as(&format!(
            "SELECT f.id, f.module_id, f.name, f.column_name, f.data_type, f.text_length, f.list_id, \
             f.sort_order, f.visible, f.visible_in_grid, f.required, f.state, NULL::TEXT AS list_name \
             FROM {} f WHERE f.module_id = $1 ORDER BY f.id FOR UPDATE",
            state.sys_table(FIELDS_TABLE)
        ))
        .bind(module_id)
        .fetch_all(&mut *conn)
        .await
        .storage("load fields")?;
        rows.into_iter().map(FieldDefinition::try_from).collect()
    }

    async fn insert_field(conn: &mut PgConnection, state: &AppState, f: &FieldDefinition) -> Result<i64, AppError> {
        sqlx::query_scalar(&format!(
            "INSERT INTO {} (module_id, name, column_name, data_type, text_length, list_id, sort_order, \
             visible, visible_in_grid, required, state) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING id",
            state.sys_table(FIELDS_TABLE)
        ))
        .bind(f.module_id)
        .bind(&f.name)
        .bind(&f.column_name)
        .bind(f.data_type.tag())
        .bind(f.data_type.text_length().map(|n| n as i32))
        .bind(f.data_type.list_id())
        .bind(f.order)
        .bind(f.visible)
        .bind(f.visible_in_grid)
        .bind(f.required)
        .bind(f.state.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(conflict_on_unique("save field", format!("column {} already exists", f.column_name)))
    }

    async fn update_field(conn: &mut PgConnection, state: &AppState, f: &FieldDefinition) -> Result<(), AppError> {
        sqlx::query(&format!(
            "UPDATE {} SET name = $1, data_type = $2, text_length = $3, list_id = $4, sort_order = $5, \
             visible = $6, visible_in_grid = $7, required = $8, state = $9 WHERE id = $10",
            state.sys_table(FIELDS_TABLE)
        ))
        .bind(&f.name)
        .bind(f.data_type.tag())
        .bind(f.data_type.text_length().map(|n| n as i32))
        .bind(f.data_type.list_id())
        .bind(f.order)
        .bind(f.visible)
        .bind(f.visible_in_grid)
        .bind(f.required)
        .bind(f.state.as_str())
        .bind(f.id)
        .execute(&mut *conn)
        .await
        .storage("save field")?;
        Ok(())
    }
}
