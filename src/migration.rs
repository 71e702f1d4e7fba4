//! Schema synchronizer: diff a module's stored fields against a requested field list
//! and produce the additive DDL that brings the table in line.
//!
//! Columns are only ever added or widened. A field missing from the request is
//! retired (state Inactive) and its column stays; naming it again reactivates the
//! same column.

use crate::catalog::types::{FieldDefinition, FieldSpec, Status};
use crate::error::AppError;
use crate::ident::column_name;
use crate::sql::ddl;
use crate::types::{DataType, TypeChange};
use sqlx::PgConnection;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, PartialEq)]
pub enum SchemaChange {
    AddColumn(FieldDefinition),
    WidenColumn { column: String, to: DataType },
}

impl SchemaChange {
    pub fn statement(&self, schema: &str, table: &str) -> String {
        match self {
            SchemaChange::AddColumn(field) => ddl::add_column(schema, table, field),
            SchemaChange::WidenColumn { column, to } => ddl::widen_column(schema, table, column, to),
        }
    }
}

/// A requested field after matching against the catalog. `existing_id` is set when
/// the field (or its column) is already known.
#[derive(Clone, Debug)]
pub struct PlannedField {
    pub existing_id: Option<i64>,
    pub definition: FieldDefinition,
}

#[derive(Clone, Debug, Default)]
pub struct Reconciliation {
    pub fields: Vec<PlannedField>,
    /// Ids of active fields no longer requested.
    pub retired: Vec<i64>,
    pub changes: Vec<SchemaChange>,
}

impl Reconciliation {
    pub fn statements(&self, schema: &str, table: &str) -> Vec<String> {
        self.changes.iter().map(|c| c.statement(schema, table)).collect()
    }
}

/// Match `next` against `previous` by physical column (case-insensitive). Previous
/// fields include inactive ones so a returning name picks up its old column.
pub fn reconcile(
    module_id: i64,
    previous: &[FieldDefinition],
    next: &[FieldSpec],
) -> Result<Reconciliation, AppError> {
    let by_column: HashMap<String, &FieldDefinition> = previous
        .iter()
        .map(|f| (f.column_name.to_lowercase(), f))
        .collect();
    let mut plan = Reconciliation::default();
    let mut kept: HashSet<i64> = HashSet::new();

    for spec in next {
        let name = spec.name.trim().to_string();
        let column = column_name(&name);
        match by_column.get(&column.to_lowercase()) {
            Some(old) => {
                match spec.data_type.change_from(&old.data_type) {
                    TypeChange::Unchanged => {}
                    TypeChange::Widen => plan.changes.push(SchemaChange::WidenColumn {
                        column: old.column_name.clone(),
                        to: spec.data_type.clone(),
                    }),
                    TypeChange::Incompatible => {
                        return Err(AppError::Validation(format!(
                            "field '{}' cannot change from {} to {}; columns may only be widened",
                            name,
                            old.data_type.physical_type(),
                            spec.data_type.physical_type()
                        )))
                    }
                }
                kept.insert(old.id);
                plan.fields.push(PlannedField {
                    existing_id: Some(old.id),
                    definition: FieldDefinition {
                        id: old.id,
                        module_id,
                        name,
                        column_name: old.column_name.clone(),
                        data_type: spec.data_type.clone(),
                        order: spec.order,
                        visible: spec.visible,
                        visible_in_grid: spec.visible_in_grid,
                        required: spec.required,
                        state: Status::Active,
                    },
                });
            }
            None => {
                let definition = FieldDefinition {
                    id: 0,
                    module_id,
                    name,
                    column_name: column,
                    data_type: spec.data_type.clone(),
                    order: spec.order,
                    visible: spec.visible,
                    visible_in_grid: spec.visible_in_grid,
                    required: spec.required,
                    state: Status::Active,
                };
                plan.changes.push(SchemaChange::AddColumn(definition.clone()));
                plan.fields.push(PlannedField {
                    existing_id: None,
                    definition,
                });
            }
        }
    }

    plan.retired = previous
        .iter()
        .filter(|f| f.state == Status::Active && !kept.contains(&f.id))
        .map(|f| f.id)
        .collect();
    Ok(plan)
}

/// Execute DDL on `conn` in order. The first failure aborts with the statement attached.
pub async fn apply(conn: &mut PgConnection, operation: &str, statements: &[String]) -> Result<(), AppError> {
    for statement in statements {
        tracing::info!(operation, statement = %statement, "ddl");
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::ddl(operation, statement, e))?;
    }
    Ok(())
}
