//! Record payload validation against a module's active fields.

use crate::catalog::{FieldDefinition, ResolvedModule};
use crate::error::AppError;
use crate::sql::BindValue;
use crate::types::is_empty;
use serde_json::{Map, Value};

pub struct PayloadValidator;

impl PayloadValidator {
    /// Values for an INSERT: every required field present and non-empty; empty
    /// optional fields are left out so the column stays NULL.
    pub fn for_insert<'m>(
        module: &'m ResolvedModule,
        payload: &Map<String, Value>,
    ) -> Result<Vec<(&'m FieldDefinition, BindValue)>, AppError> {
        let supplied = match_fields(module, payload)?;
        for field in module.fields.iter().filter(|f| f.required) {
            let present = supplied
                .iter()
                .any(|(f, v)| f.id == field.id && !is_empty(v));
            if !present {
                return Err(AppError::Validation(format!("{} is required", field.name)));
            }
        }
        let mut out = Vec::with_capacity(supplied.len());
        for (field, raw) in supplied {
            if is_empty(raw) {
                continue;
            }
            out.push((field, field.data_type.coerce(&field.name, raw)?));
        }
        Ok(out)
    }

    /// Values for a partial UPDATE: only supplied keys. An empty value clears the
    /// column, except on required fields.
    pub fn for_update<'m>(
        module: &'m ResolvedModule,
        payload: &Map<String, Value>,
    ) -> Result<Vec<(&'m FieldDefinition, BindValue)>, AppError> {
        let supplied = match_fields(module, payload)?;
        let mut out = Vec::with_capacity(supplied.len());
        for (field, raw) in supplied {
            if field.required && is_empty(raw) {
                return Err(AppError::Validation(format!("{} is required", field.name)));
            }
            out.push((field, field.data_type.coerce(&field.name, raw)?));
        }
        Ok(out)
    }
}

/// Pair payload keys with fields by display name or column name, case-insensitive.
/// Keys naming no active field are skipped.
fn match_fields<'m, 'p>(
    module: &'m ResolvedModule,
    payload: &'p Map<String, Value>,
) -> Result<Vec<(&'m FieldDefinition, &'p Value)>, AppError> {
    let mut out: Vec<(&FieldDefinition, &Value)> = Vec::with_capacity(payload.len());
    for (key, value) in payload {
        let field = module.field(key).or_else(|| {
            module
                .fields
                .iter()
                .find(|f| f.column_name.eq_ignore_ascii_case(key))
        });
        match field {
            Some(f) => {
                if out.iter().any(|(seen, _)| seen.id == f.id) {
                    return Err(AppError::Validation(format!(
                        "{} is supplied more than once",
                        f.name
                    )));
                }
                out.push((f, value));
            }
            None => tracing::debug!(module = %module.module.name, key = %key, "ignoring unknown payload key"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Module, ModuleKind, Status};
    use crate::sql::ValueKind;
    use crate::types::DataType;
    use chrono::NaiveDate;
    use serde_json::json;

    fn field(id: i64, name: &str, data_type: DataType, required: bool) -> FieldDefinition {
        FieldDefinition {
            id,
            module_id: 1,
            name: name.into(),
            column_name: crate::ident::column_name(name),
            data_type,
            order: id as i32,
            visible: true,
            visible_in_grid: true,
            required,
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
                field(1, "Name", DataType::Text { length: 100 }, true),
                field(2, "Birth date", DataType::Date, false),
                field(3, "Room", DataType::Number, false),
            ],
        }
    }

    fn payload(v: serde_json::Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_requires_required_fields() {
        let m = residents();
        let err = PayloadValidator::for_insert(&m, &payload(json!({"Room": 4}))).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref msg) if msg.contains("Name")));
        let err = PayloadValidator::for_insert(&m, &payload(json!({"Name": "  "}))).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_insert_coerces_and_skips_empty_optional() {
        let m = residents();
        let values = PayloadValidator::for_insert(
            &m,
            &payload(json!({"Name": "Ana", "Birth date": "1950-03-01", "Room": "", "Unknown": 1})),
        )
        .unwrap();
        assert_eq!(values.len(), 2);
        let get = |name: &str| values.iter().find(|(f, _)| f.name == name).map(|(_, v)| v.clone());
        assert_eq!(get("Name"), Some(BindValue::Text("Ana".into())));
        assert_eq!(
            get("Birth date"),
            Some(BindValue::Date(NaiveDate::from_ymd_opt(1950, 3, 1).unwrap()))
        );
        assert_eq!(get("Room"), None);
    }

    #[test]
    fn test_keys_match_column_name_case_insensitively() {
        let m = residents();
        let values =
            PayloadValidator::for_insert(&m, &payload(json!({"name": "Ana", "birth_date": "1950-03-01"})))
                .unwrap();
        assert_eq!(values.len(), 2);
        let dup = PayloadValidator::for_insert(&m, &payload(json!({"Name": "Ana", "name": "Bo"})));
        assert!(matches!(dup, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_update_is_partial_and_clears_optional() {
        let m = residents();
        let values = PayloadValidator::for_update(&m, &payload(json!({"Room": null}))).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].0.name, "Room");
        assert_eq!(values[0].1, BindValue::Null(ValueKind::Float));
        assert!(PayloadValidator::for_update(&m, &payload(json!({}))).unwrap().is_empty());
    }

    #[test]
    fn test_update_cannot_clear_required() {
        let m = residents();
        let res = PayloadValidator::for_update(&m, &payload(json!({"Name": ""})));
        assert!(matches!(res, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_bad_value_names_field() {
        let m = residents();
        let err = PayloadValidator::for_update(&m, &payload(json!({"Birth date": "31/12/1950"}))).unwrap_err();
        assert!(err.to_string().contains("Birth date"));
    }
}
