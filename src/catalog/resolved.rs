//! Resolved module: catalog rows flattened for runtime query building.

use crate::catalog::types::{FieldDefinition, Module, ModuleKind};
use crate::ident::qualified;

/// Link from a Secondary module to its Principal parent.
#[derive(Clone, Debug, PartialEq)]
pub struct ParentLink {
    pub module_id: i64,
    pub module_name: String,
    pub table_name: String,
    /// `<ParentTable>_Id` column in the child table.
    pub fk_column: String,
}

#[derive(Clone, Debug)]
pub struct ResolvedModule {
    pub schema: String,
    pub module: Module,
    pub parent: Option<ParentLink>,
    /// Active fields only, in display order.
    pub fields: Vec<FieldDefinition>,
}

impl ResolvedModule {
    pub fn table(&self) -> String {
        qualified(&self.schema, &self.module.table_name)
    }

    pub fn is_secondary(&self) -> bool {
        self.module.kind == ModuleKind::Secondary
    }

    /// Field by display name, case-insensitive.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn process_label(&self) -> String {
        format!("Module: {}", self.module.name)
    }

    /// Record JSON key for a selected column: the field's display name, or the
    /// column itself for system and parent FK columns.
    pub fn record_key(&self, column: &str) -> String {
        self.fields
            .iter()
            .find(|f| f.column_name == column)
            .map(|f| f.name.clone())
            .unwrap_or_else(|| column.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::Status;
    use crate::types::DataType;

    #[test]
    fn test_record_key_maps_columns_to_display_names() {
        let long = "Emergency contact phone number for the primary guardian of resident";
        let module = ResolvedModule {
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
            fields: vec![FieldDefinition {
                id: 1,
                module_id: 1,
                name: long.into(),
                column_name: crate::ident::column_name(long),
                data_type: DataType::Text { length: 20 },
                order: 0,
                visible: true,
                visible_in_grid: true,
                required: false,
                state: Status::Active,
            }],
        };
        assert_eq!(module.record_key(&crate::ident::column_name(long)), long);
        assert_eq!(module.record_key("CreatedAt"), "CreatedAt");
    }
}
