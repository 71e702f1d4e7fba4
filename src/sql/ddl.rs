//! DDL text for module tables. No statement here ever drops a column.

use crate::catalog::types::{
    FieldDefinition, Status, COL_CREATED_AT, COL_CREATED_BY, COL_ID, COL_MODIFIED_AT,
    COL_MODIFIED_BY, COL_STATE,
};
use crate::catalog::ParentLink;
use crate::ident::{qualified, quoted};
use crate::store::LIST_VALUES_TABLE;
use crate::types::DataType;

/// Column definition for a field: type, plus the list FK for ListRef.
pub fn column_definition(schema: &str, field: &FieldDefinition) -> String {
    let mut def = format!("{} {}", quoted(&field.column_name), field.data_type.physical_type());
    if let DataType::ListRef { .. } = field.data_type {
        def.push_str(&format!(
            " REFERENCES {} ({})",
            qualified(schema, LIST_VALUES_TABLE),
            quoted("id")
        ));
    }
    def
}

/// Full CREATE TABLE: identity key, parent FK, field columns, then state and audit columns.
pub fn create_table(
    schema: &str,
    table: &str,
    parent: Option<&ParentLink>,
    fields: &[FieldDefinition],
) -> String {
    let mut defs = vec![format!(
        "{} BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
        quoted(COL_ID)
    )];
    if let Some(p) = parent {
        defs.push(format!(
            "{} BIGINT NOT NULL REFERENCES {} ({}) ON DELETE CASCADE",
            quoted(&p.fk_column),
            qualified(schema, &p.table_name),
            quoted(COL_ID)
        ));
    }
    for f in fields {
        defs.push(column_definition(schema, f));
    }
    defs.push(format!(
        "{} VARCHAR(8) NOT NULL DEFAULT '{}' CHECK ({} IN ('{}', '{}'))",
        quoted(COL_STATE),
        Status::Active.as_str(),
        quoted(COL_STATE),
        Status::Active.as_str(),
        Status::Inactive.as_str()
    ));
    defs.push(format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", quoted(COL_CREATED_AT)));
    defs.push(format!("{} TIMESTAMPTZ", quoted(COL_MODIFIED_AT)));
    defs.push(format!("{} BIGINT", quoted(COL_CREATED_BY)));
    defs.push(format!("{} BIGINT", quoted(COL_MODIFIED_BY)));
    format!(
        "CREATE TABLE {} (\n  {}\n)",
        qualified(schema, table),
        defs.join(",\n  ")
    )
}

pub fn add_column(schema: &str, table: &str, field: &FieldDefinition) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        qualified(schema, table),
        column_definition(schema, field)
    )
}

/// Caller guarantees `to` widens the current column type.
pub fn widen_column(schema: &str, table: &str, column: &str, to: &DataType) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
        qualified(schema, table),
        quoted(column),
        to.physical_type()
    )
}

pub fn rename_table(schema: &str, old: &str, new: &str) -> String {
    format!("ALTER TABLE {} RENAME TO {}", qualified(schema, old), quoted(new))
}

pub fn rename_column(schema: &str, table: &str, old: &str, new: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        qualified(schema, table),
        quoted(old),
        quoted(new)
    )
}

/// Only issued after the table was verified empty and unreferenced.
pub fn drop_table(schema: &str, table: &str) -> String {
    format!("DROP TABLE {}", qualified(schema, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, data_type: DataType) -> FieldDefinition {
        FieldDefinition {
            id: 0,
            module_id: 0,
            name: name.into(),
            column_name: crate::ident::column_name(name),
            data_type,
            order: 0,
            visible: true,
            visible_in_grid: true,
            required: false,
            state: Status::Active,
        }
    }

    #[test]
    fn test_create_principal_table() {
        let fields = vec![
            field("Name", DataType::Text { length: 100 }),
            field("BirthDate", DataType::Date),
        ];
        let sql = create_table("mm", "MODULE_RESIDENTS", None, &fields);
        let expected_order = [
            "\"Id\" BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
            "\"Name\" VARCHAR(100)",
            "\"BirthDate\" DATE",
            "\"State\" VARCHAR(8) NOT NULL DEFAULT 'Active'",
            "\"CreatedAt\" TIMESTAMPTZ NOT NULL DEFAULT NOW()",
            "\"ModifiedAt\" TIMESTAMPTZ",
            "\"CreatedBy\" BIGINT",
            "\"ModifiedBy\" BIGINT",
        ];
        let mut last = 0;
        for part in expected_order {
            let pos = sql[last..].find(part).map(|p| p + last);
            assert!(pos.is_some(), "missing or out of order: {}", part);
            last = pos.unwrap();
        }
        assert!(sql.starts_with("CREATE TABLE \"mm\".\"MODULE_RESIDENTS\" ("));
    }

    #[test]
    fn test_create_secondary_table_has_cascading_parent_fk() {
        let parent = ParentLink {
            module_id: 1,
            module_name: "Residents".into(),
            table_name: "MODULE_RESIDENTS".into(),
            fk_column: "MODULE_RESIDENTS_Id".into(),
        };
        let sql = create_table("mm", "MODULE_VISITS", Some(&parent), &[]);
        assert!(sql.contains(
            "\"MODULE_RESIDENTS_Id\" BIGINT NOT NULL REFERENCES \"mm\".\"MODULE_RESIDENTS\" (\"Id\") ON DELETE CASCADE"
        ));
    }

    #[test]
    fn test_list_ref_column_references_list_values() {
        let def = column_definition("mm", &field("Status", DataType::ListRef { list_id: 2 }));
        assert_eq!(def, "\"Status\" BIGINT REFERENCES \"mm\".\"_sys_list_values\" (\"id\")");
    }

    #[test]
    fn test_alter_statements() {
        assert_eq!(
            add_column("mm", "MODULE_X", &field("Notes", DataType::LongText)),
            "ALTER TABLE \"mm\".\"MODULE_X\" ADD COLUMN \"Notes\" TEXT"
        );
        assert_eq!(
            widen_column("mm", "MODULE_X", "Name", &DataType::Text { length: 255 }),
            "ALTER TABLE \"mm\".\"MODULE_X\" ALTER COLUMN \"Name\" TYPE VARCHAR(255)"
        );
        assert_eq!(
            rename_table("mm", "MODULE_X", "MODULE_Y"),
            "ALTER TABLE \"mm\".\"MODULE_X\" RENAME TO \"MODULE_Y\""
        );
        assert_eq!(
            rename_column("mm", "MODULE_C", "MODULE_X_Id", "MODULE_Y_Id"),
            "ALTER TABLE \"mm\".\"MODULE_C\" RENAME COLUMN \"MODULE_X_Id\" TO \"MODULE_Y_Id\""
        );
    }
}
