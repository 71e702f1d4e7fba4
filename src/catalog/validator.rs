//! Definition checks that need no database: names, reserved columns, kind/parent shape.

use crate::catalog::types::{FieldSpec, ModuleKind, ModuleSpec, SYSTEM_COLUMNS};
use crate::error::AppError;
use crate::ident::column_name;
use std::collections::HashSet;

pub const MAX_NAME_LEN: usize = 100;

fn check_name(what: &str, name: &str) -> Result<(), AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} name is required", what)));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "{} name '{}' is longer than {} characters",
            what, trimmed, MAX_NAME_LEN
        )));
    }
    if !trimmed.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::Validation(format!(
            "{} name '{}' has no letters or digits",
            what, trimmed
        )));
    }
    Ok(())
}

/// Module name plus kind/parent consistency. Whether the parent is a Principal
/// module is checked against the catalog.
pub fn validate_header(spec: &ModuleSpec) -> Result<(), AppError> {
    check_name("module", &spec.name)?;
    match (spec.kind, spec.parent_module_id) {
        (ModuleKind::Secondary, None) => Err(AppError::Validation(format!(
            "secondary module '{}' needs a parent module",
            spec.name.trim()
        ))),
        (ModuleKind::Principal | ModuleKind::Independent, Some(_)) => {
            Err(AppError::Validation(format!(
                "only secondary modules have a parent; '{}' is {}",
                spec.name.trim(),
                spec.kind.as_str()
            )))
        }
        _ => Ok(()),
    }
}

/// Field list checks: names, types, and column collisions with each other, the
/// system columns and the parent FK column.
pub fn validate_fields(fields: &[FieldSpec], parent_fk: Option<&str>) -> Result<(), AppError> {
    let reserved: HashSet<String> = SYSTEM_COLUMNS
        .iter()
        .map(|c| c.to_lowercase())
        .chain(parent_fk.map(str::to_lowercase))
        .collect();
    let mut names: HashSet<String> = HashSet::new();
    let mut columns: HashSet<String> = HashSet::new();
    for f in fields {
        check_name("field", &f.name)?;
        let name = f.name.trim();
        f.data_type.validate(name)?;
        let column = column_name(name).to_lowercase();
        if reserved.contains(&name.to_lowercase()) || reserved.contains(&column) {
            return Err(AppError::Validation(format!(
                "field name '{}' is reserved",
                name
            )));
        }
        if !names.insert(name.to_lowercase()) {
            return Err(AppError::Validation(format!("duplicate field '{}'", name)));
        }
        if !columns.insert(column) {
            return Err(AppError::Conflict(format!(
                "field '{}' maps to the same column as another field",
                name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::Status;
    use crate::types::DataType;

    fn spec(kind: ModuleKind, parent: Option<i64>) -> ModuleSpec {
        ModuleSpec {
            name: "Visits".into(),
            kind,
            parent_module_id: parent,
            icon: None,
            display_order: 0,
            state: Status::Active,
            fields: vec![],
        }
    }

    fn f(name: &str) -> FieldSpec {
        FieldSpec {
            name: name.into(),
            data_type: DataType::Text { length: 50 },
            order: 0,
            visible: true,
            visible_in_grid: true,
            required: false,
        }
    }

    #[test]
    fn test_kind_parent_consistency() {
        assert!(validate_header(&spec(ModuleKind::Secondary, Some(1))).is_ok());
        assert!(validate_header(&spec(ModuleKind::Principal, None)).is_ok());
        assert!(matches!(
            validate_header(&spec(ModuleKind::Secondary, None)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_header(&spec(ModuleKind::Independent, Some(1))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_module_name_rules() {
        let mut s = spec(ModuleKind::Principal, None);
        s.name = "  ".into();
        assert!(validate_header(&s).is_err());
        s.name = "!!!".into();
        assert!(validate_header(&s).is_err());
        s.name = "x".repeat(MAX_NAME_LEN + 1);
        assert!(validate_header(&s).is_err());
    }

    #[test]
    fn test_reserved_columns_rejected() {
        assert!(validate_fields(&[f("state")], None).is_err());
        assert!(validate_fields(&[f("Created At")], None).is_ok());
        assert!(validate_fields(&[f("CreatedAt")], None).is_err());
        assert!(validate_fields(&[f("MODULE_RESIDENTS_Id")], Some("MODULE_RESIDENTS_Id")).is_err());
        assert!(validate_fields(&[f("MODULE_RESIDENTS_Id")], None).is_ok());
    }

    #[test]
    fn test_duplicates() {
        assert!(matches!(
            validate_fields(&[f("Name"), f("name")], None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_fields(&[f("First name"), f("First-name")], None),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_bad_type_rejected() {
        let mut field = f("Notes");
        field.data_type = DataType::Text { length: 0 };
        assert!(validate_fields(&[field], None).is_err());
    }
}
