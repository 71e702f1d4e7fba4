//! Builds parameterized SELECT, INSERT and UPDATE statements for a resolved module.
//!
//! Identifiers come only from the catalog (sanitized at definition time) and are
//! quoted; values are always pushed as parameters.

use crate::catalog::types::{
    FieldDefinition, Status, COL_CREATED_AT, COL_CREATED_BY, COL_ID, COL_MODIFIED_AT,
    COL_MODIFIED_BY, COL_STATE,
};
use crate::catalog::ResolvedModule;
use crate::error::AppError;
use crate::ident::{qualified, quoted};
use crate::sql::params::BindValue;
use crate::store::LIST_VALUES_TABLE;
use crate::types::DataType;

const MAIN_ALIAS: &str = "main";
pub const TOTAL_ALIAS: &str = "Total";

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl QueryBuf {
    pub(crate) fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a value and return its placeholder.
    pub(crate) fn push_param(&mut self, v: BindValue) -> String {
        self.params.push(v);
        format!("${}", self.params.len())
    }
}

fn main_col(column: &str) -> String {
    format!("{}.{}", MAIN_ALIAS, quoted(column))
}

fn active_literal() -> String {
    format!("'{}'", Status::Active.as_str())
}

/// Alias for the list-values join of the field at `index`. Unique within one statement.
fn list_alias(index: usize) -> String {
    format!("lv{}", index)
}

/// SELECT list and joins. ListRef fields become the joined label when `resolve_lists` is set.
/// Columns are aliased by physical name; display names can exceed the identifier limit.
fn select_parts(module: &ResolvedModule, resolve_lists: bool) -> (Vec<String>, Vec<String>) {
    let values_table = qualified(&module.schema, LIST_VALUES_TABLE);
    let mut cols = vec![format!("{} AS {}", main_col(COL_ID), quoted(COL_ID))];
    if let Some(parent) = &module.parent {
        cols.push(format!(
            "{} AS {}",
            main_col(&parent.fk_column),
            quoted(&parent.fk_column)
        ));
    }
    let mut joins = Vec::new();
    for (i, f) in module.fields.iter().enumerate() {
        if resolve_lists && matches!(f.data_type, DataType::ListRef { .. }) {
            let alias = list_alias(i);
            joins.push(format!(
                "LEFT JOIN {} {} ON {}.{} = {}",
                values_table,
                alias,
                alias,
                quoted("id"),
                main_col(&f.column_name)
            ));
            cols.push(format!("{}.{} AS {}", alias, quoted("label"), quoted(&f.column_name)));
        } else {
            cols.push(format!("{} AS {}", main_col(&f.column_name), quoted(&f.column_name)));
        }
    }
    for sys in [COL_STATE, COL_CREATED_AT, COL_MODIFIED_AT, COL_CREATED_BY, COL_MODIFIED_BY] {
        cols.push(format!("{} AS {}", main_col(sys), quoted(sys)));
    }
    (cols, joins)
}

fn from_clause(module: &ResolvedModule, joins: &[String]) -> String {
    let mut from = format!("{} {}", module.table(), MAIN_ALIAS);
    for j in joins {
        from.push(' ');
        from.push_str(j);
    }
    from
}

/// Active rows, newest first, optionally restricted to one parent record.
pub fn select_list(
    module: &ResolvedModule,
    parent_id: Option<i64>,
    limit: u32,
    offset: u32,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let (cols, joins) = select_parts(module, true);
    let mut where_parts = vec![format!("{} = {}", main_col(COL_STATE), active_literal())];
    if let (Some(parent), Some(pid)) = (&module.parent, parent_id) {
        let ph = q.push_param(BindValue::Int(pid));
        where_parts.push(format!("{} = {}", main_col(&parent.fk_column), ph));
    }
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {} DESC LIMIT {} OFFSET {}",
        cols.join(", "),
        from_clause(module, &joins),
        where_parts.join(" AND "),
        main_col(COL_ID),
        limit,
        offset
    );
    q
}

/// One row by id regardless of state.
pub fn select_by_id(module: &ResolvedModule, id: i64, resolve_lists: bool) -> QueryBuf {
    let mut q = QueryBuf::new();
    let (cols, joins) = select_parts(module, resolve_lists);
    let ph = q.push_param(BindValue::Int(id));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        cols.join(", "),
        from_clause(module, &joins),
        main_col(COL_ID),
        ph
    );
    q
}

/// Active rows where one field equals `value`, capped at `limit`.
pub fn select_filtered(
    module: &ResolvedModule,
    field: &FieldDefinition,
    value: BindValue,
    limit: u32,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let (cols, joins) = select_parts(module, true);
    let ph = q.push_param(value);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {} AND {} = {} ORDER BY {} DESC LIMIT {}",
        cols.join(", "),
        from_clause(module, &joins),
        main_col(COL_STATE),
        active_literal(),
        main_col(&field.column_name),
        ph,
        main_col(COL_ID),
        limit
    );
    q
}

/// Counts of active rows per value of `field`; ListRef fields group on the label.
pub fn select_grouped(module: &ResolvedModule, field: &FieldDefinition) -> QueryBuf {
    let mut q = QueryBuf::new();
    let (target, join) = match field.data_type {
        DataType::ListRef { .. } => {
            let alias = list_alias(0);
            let join = format!(
                " LEFT JOIN {} {} ON {}.{} = {}",
                qualified(&module.schema, LIST_VALUES_TABLE),
                alias,
                alias,
                quoted("id"),
                main_col(&field.column_name)
            );
            (format!("{}.{}", alias, quoted("label")), join)
        }
        _ => (main_col(&field.column_name), String::new()),
    };
    q.sql = format!(
        "SELECT {} AS {}, COUNT(*) AS {} FROM {} {}{} WHERE {} = {} GROUP BY {} ORDER BY {} DESC, 1",
        target,
        quoted(&field.column_name),
        quoted(TOTAL_ALIAS),
        module.table(),
        MAIN_ALIAS,
        join,
        main_col(COL_STATE),
        active_literal(),
        target,
        quoted(TOTAL_ALIAS)
    );
    q
}

/// INSERT of the supplied (already coerced, non-empty) values. Returns the new id.
pub fn insert(
    module: &ResolvedModule,
    values: &[(&FieldDefinition, BindValue)],
    parent_id: Option<i64>,
    actor_id: i64,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    if let Some(parent) = &module.parent {
        let pid = parent_id.ok_or_else(|| {
            AppError::Validation(format!(
                "a {} record id is required for {}",
                parent.module_name, module.module.name
            ))
        })?;
        cols.push(quoted(&parent.fk_column));
        placeholders.push(q.push_param(BindValue::Int(pid)));
    }
    for (field, value) in values {
        cols.push(quoted(&field.column_name));
        placeholders.push(q.push_param(value.clone()));
    }
    cols.push(quoted(COL_STATE));
    placeholders.push(active_literal());
    cols.push(quoted(COL_CREATED_AT));
    placeholders.push("NOW()".into());
    cols.push(quoted(COL_CREATED_BY));
    placeholders.push(q.push_param(BindValue::Int(actor_id)));
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        module.table(),
        cols.join(", "),
        placeholders.join(", "),
        quoted(COL_ID)
    );
    Ok(q)
}

/// UPDATE of the supplied columns only; modification stamps always set. Active rows only.
pub fn update(
    module: &ResolvedModule,
    id: i64,
    values: &[(&FieldDefinition, BindValue)],
    actor_id: i64,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (field, value) in values {
        let ph = q.push_param(value.clone());
        sets.push(format!("{} = {}", quoted(&field.column_name), ph));
    }
    sets.push(format!("{} = NOW()", quoted(COL_MODIFIED_AT)));
    let actor_ph = q.push_param(BindValue::Int(actor_id));
    sets.push(format!("{} = {}", quoted(COL_MODIFIED_BY), actor_ph));
    let id_ph = q.push_param(BindValue::Int(id));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} AND {} = {} RETURNING {}",
        module.table(),
        sets.join(", "),
        quoted(COL_ID),
        id_ph,
        quoted(COL_STATE),
        active_literal(),
        quoted(COL_ID)
    );
    q
}

/// Soft delete: flip State to Inactive. Never a physical DELETE.
pub fn soft_delete(module: &ResolvedModule, id: i64, actor_id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let actor_ph = q.push_param(BindValue::Int(actor_id));
    let id_ph = q.push_param(BindValue::Int(id));
    q.sql = format!(
        "UPDATE {} SET {} = '{}', {} = NOW(), {} = {} WHERE {} = {} AND {} = {} RETURNING {}",
        module.table(),
        quoted(COL_STATE),
        Status::Inactive.as_str(),
        quoted(COL_MODIFIED_AT),
        quoted(COL_MODIFIED_BY),
        actor_ph,
        quoted(COL_ID),
        id_ph,
        quoted(COL_STATE),
        active_literal(),
        quoted(COL_ID)
    );
    q
}

/// Whether an active row with this id exists in `table` (schema-qualified, quoted).
pub fn exists_active(table: &str, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_param(BindValue::Int(id));
    q.sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = {} AND {} = {})",
        table,
        quoted(COL_ID),
        ph,
        quoted(COL_STATE),
        active_literal()
    );
    q
}

/// Total physical rows, any state.
pub fn count_rows(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::{Module, ModuleKind};
    use crate::catalog::ParentLink;

    fn field(id: i64, name: &str, column: &str, data_type: DataType) -> FieldDefinition {
        FieldDefinition {
            id,
            module_id: 1,
            name: name.into(),
            column_name: column.into(),
            data_type,
            order: id as i32,
            visible: true,
            visible_in_grid: true,
            required: false,
            state: Status::Active,
        }
    }

    fn residents() -> ResolvedModule {
        ResolvedModule {
            schema: "mm".into(),
            module: Module {
                id: 1,
                name: "Residents".into(),
                table_name: "MODULE_RESIDENTS".into(),
                kind: ModuleKind::Principal,
                parent_module_id: None,
                icon: None,
                display_order: 0,
                state: Status::Active,
            },
            parent: None,
            fields: vec![
                field(1, "Full name", "Full_name", DataType::Text { length: 100 }),
                field(2, "Status", "Status", DataType::ListRef { list_id: 4 }),
                field(3, "Ward", "Ward", DataType::ListRef { list_id: 5 }),
            ],
        }
    }

    fn visits() -> ResolvedModule {
        ResolvedModule {
            schema: "mm".into(),
            module: Module {
                id: 2,
                name: "Visits".into(),
                table_name: "MODULE_VISITS".into(),
                kind: ModuleKind::Secondary,
                parent_module_id: Some(1),
                icon: None,
                display_order: 0,
                state: Status::Active,
            },
            parent: Some(ParentLink {
                module_id: 1,
                module_name: "Residents".into(),
                table_name: "MODULE_RESIDENTS".into(),
                fk_column: "MODULE_RESIDENTS_Id".into(),
            }),
            fields: vec![field(4, "Notes", "Notes", DataType::LongText)],
        }
    }

    #[test]
    fn test_select_list_aliases_fields_by_column() {
        let q = select_list(&residents(), None, 100, 0);
        assert!(q.sql.starts_with("SELECT main.\"Id\" AS \"Id\", main.\"Full_name\" AS \"Full_name\""));
        assert!(q.sql.contains("FROM \"mm\".\"MODULE_RESIDENTS\" main"));
        assert!(q.sql.contains("WHERE main.\"State\" = 'Active'"));
        assert!(q.sql.ends_with("ORDER BY main.\"Id\" DESC LIMIT 100 OFFSET 0"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_list_joins_use_distinct_aliases() {
        let q = select_list(&residents(), None, 10, 0);
        assert!(q.sql.contains("LEFT JOIN \"mm\".\"_sys_list_values\" lv1 ON lv1.\"id\" = main.\"Status\""));
        assert!(q.sql.contains("LEFT JOIN \"mm\".\"_sys_list_values\" lv2 ON lv2.\"id\" = main.\"Ward\""));
        assert!(q.sql.contains("lv1.\"label\" AS \"Status\""));
        assert!(q.sql.contains("lv2.\"label\" AS \"Ward\""));
    }

    #[test]
    fn test_select_by_id_raw_has_no_joins() {
        let q = select_by_id(&residents(), 9, false);
        assert!(!q.sql.contains("JOIN"));
        assert!(q.sql.contains("main.\"Status\" AS \"Status\""));
        assert!(q.sql.ends_with("WHERE main.\"Id\" = $1"));
        assert_eq!(q.params, vec![BindValue::Int(9)]);
    }

    #[test]
    fn test_detail_list_filters_on_parent() {
        let q = select_list(&visits(), Some(12), 20, 40);
        assert!(q.sql.contains("main.\"MODULE_RESIDENTS_Id\" AS \"MODULE_RESIDENTS_Id\""));
        assert!(q.sql.contains("AND main.\"MODULE_RESIDENTS_Id\" = $1"));
        assert!(q.sql.ends_with("LIMIT 20 OFFSET 40"));
        assert_eq!(q.params, vec![BindValue::Int(12)]);
    }

    #[test]
    fn test_insert_binds_values_and_stamps() {
        let m = residents();
        let values = vec![(&m.fields[0], BindValue::Text("Ana".into()))];
        let q = insert(&m, &values, None, 77).unwrap();
        assert_eq!(
            q.sql,
            "INSERT INTO \"mm\".\"MODULE_RESIDENTS\" (\"Full_name\", \"State\", \"CreatedAt\", \"CreatedBy\") VALUES ($1, 'Active', NOW(), $2) RETURNING \"Id\""
        );
        assert_eq!(q.params, vec![BindValue::Text("Ana".into()), BindValue::Int(77)]);
        assert!(!q.sql.contains("Ana"));
    }

    #[test]
    fn test_insert_secondary_requires_parent() {
        let m = visits();
        assert!(matches!(insert(&m, &[], None, 1), Err(AppError::Validation(_))));
        let q = insert(&m, &[], Some(3), 1).unwrap();
        assert!(q.sql.contains("(\"MODULE_RESIDENTS_Id\", \"State\""));
        assert_eq!(q.params[0], BindValue::Int(3));
    }

    #[test]
    fn test_update_sets_only_supplied_columns() {
        let m = residents();
        let values = vec![(&m.fields[1], BindValue::Int(8))];
        let q = update(&m, 5, &values, 2);
        assert_eq!(
            q.sql,
            "UPDATE \"mm\".\"MODULE_RESIDENTS\" SET \"Status\" = $1, \"ModifiedAt\" = NOW(), \"ModifiedBy\" = $2 WHERE \"Id\" = $3 AND \"State\" = 'Active' RETURNING \"Id\""
        );
        assert!(!q.sql.contains("CreatedAt"));
        assert!(!q.sql.contains("Full_name"));
    }

    #[test]
    fn test_soft_delete_is_an_update() {
        let q = soft_delete(&residents(), 5, 2);
        assert!(q.sql.starts_with("UPDATE \"mm\".\"MODULE_RESIDENTS\" SET \"State\" = 'Inactive'"));
        assert!(!q.sql.contains("DELETE"));
        assert_eq!(q.params, vec![BindValue::Int(2), BindValue::Int(5)]);
    }

    #[test]
    fn test_grouped_on_list_field_targets_label() {
        let m = residents();
        let q = select_grouped(&m, &m.fields[1]);
        assert!(q.sql.starts_with("SELECT lv0.\"label\" AS \"Status\", COUNT(*) AS \"Total\""));
        assert!(q.sql.contains("GROUP BY lv0.\"label\" ORDER BY \"Total\" DESC"));
    }

    #[test]
    fn test_grouped_on_plain_field() {
        let m = residents();
        let q = select_grouped(&m, &m.fields[0]);
        assert!(q.sql.contains("GROUP BY main.\"Full_name\""));
        assert!(!q.sql.contains("JOIN"));
    }

    #[test]
    fn test_filtered_binds_value_and_caps_rows() {
        let m = residents();
        let q = select_filtered(&m, &m.fields[0], BindValue::Text("x' OR 1=1 --".into()), 10);
        assert!(q.sql.contains("AND main.\"Full_name\" = $1"));
        assert!(q.sql.ends_with("LIMIT 10"));
        assert!(!q.sql.contains("OR 1=1"));
    }

    #[test]
    fn test_long_display_name_never_reaches_sql() {
        let mut m = residents();
        let long = "Número de habitación asignada según el último ingreso ñññññ";
        m.fields[0].name = long.into();
        m.fields[0].column_name = crate::ident::column_name(long);
        for q in [select_by_id(&m, 1, true), select_grouped(&m, &m.fields[0])] {
            assert!(!q.sql.contains(long));
            assert!(q.sql.is_ascii());
        }
    }
}
