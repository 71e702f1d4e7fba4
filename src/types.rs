//! Field data types: physical column type, widening rules and value coercion.
//!
//! The mapper knows only the storage representation. ListRef values are plain
//! integer keys here; membership in the referenced list is checked by the record
//! service, and FileRef values are opaque document ids.

use crate::error::AppError;
use crate::sql::{BindValue, ValueKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_TEXT_LENGTH: u32 = 4000;
pub const DEFAULT_TEXT_LENGTH: u32 = 255;
/// Document ids returned by the document store fit in this many characters.
pub const FILE_REF_LENGTH: u32 = 255;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DataType {
    Text {
        #[serde(default = "default_text_length")]
        length: u32,
    },
    LongText,
    Number,
    Date,
    DateTime,
    ListRef { list_id: i64 },
    FileRef,
}

fn default_text_length() -> u32 {
    DEFAULT_TEXT_LENGTH
}

/// How an existing column relates to a requested type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeChange {
    Unchanged,
    Widen,
    Incompatible,
}

impl DataType {
    /// Catalog tag stored in `_sys_fields.data_type`.
    pub fn tag(&self) -> &'static str {
        match self {
            DataType::Text { .. } => "Text",
            DataType::LongText => "LongText",
            DataType::Number => "Number",
            DataType::Date => "Date",
            DataType::DateTime => "DateTime",
            DataType::ListRef { .. } => "ListRef",
            DataType::FileRef => "FileRef",
        }
    }

    /// Rebuild from the catalog columns.
    pub fn from_parts(tag: &str, length: Option<i32>, list_id: Option<i64>) -> Result<Self, AppError> {
        Ok(match tag {
            "Text" => DataType::Text {
                length: length.map(|n| n.max(1) as u32).unwrap_or(DEFAULT_TEXT_LENGTH),
            },
            "LongText" => DataType::LongText,
            "Number" => DataType::Number,
            "Date" => DataType::Date,
            "DateTime" => DataType::DateTime,
            "ListRef" => DataType::ListRef {
                list_id: list_id
                    .ok_or_else(|| AppError::Validation("ListRef field without list".into()))?,
            },
            "FileRef" => DataType::FileRef,
            other => return Err(AppError::Validation(format!("unknown data type '{}'", other))),
        })
    }

    pub fn text_length(&self) -> Option<u32> {
        match self {
            DataType::Text { length } => Some(*length),
            _ => None,
        }
    }

    pub fn list_id(&self) -> Option<i64> {
        match self {
            DataType::ListRef { list_id } => Some(*list_id),
            _ => None,
        }
    }

    /// Column type token for DDL.
    pub fn physical_type(&self) -> String {
        match self {
            DataType::Text { length } => format!("VARCHAR({})", length),
            DataType::LongText => "TEXT".into(),
            DataType::Number => "DOUBLE PRECISION".into(),
            DataType::Date => "DATE".into(),
            DataType::DateTime => "TIMESTAMP".into(),
            DataType::ListRef { .. } => "BIGINT".into(),
            DataType::FileRef => format!("VARCHAR({})", FILE_REF_LENGTH),
        }
    }

    pub fn value_kind(&self) -> ValueKind {
        match self {
            DataType::Text { .. } | DataType::LongText | DataType::FileRef => ValueKind::Text,
            DataType::Number => ValueKind::Float,
            DataType::Date => ValueKind::Date,
            DataType::DateTime => ValueKind::DateTime,
            DataType::ListRef { .. } => ValueKind::Int,
        }
    }

    /// Reject definitions the store cannot hold.
    pub fn validate(&self, field: &str) -> Result<(), AppError> {
        match self {
            DataType::Text { length } if *length == 0 || *length > MAX_TEXT_LENGTH => {
                Err(AppError::Validation(format!(
                    "{}: text length must be between 1 and {}",
                    field, MAX_TEXT_LENGTH
                )))
            }
            DataType::ListRef { list_id } if *list_id <= 0 => Err(AppError::Validation(format!(
                "{}: list reference must name a list",
                field
            ))),
            _ => Ok(()),
        }
    }

    /// Compare against the type of an existing column. Only widening is allowed.
    pub fn change_from(&self, previous: &DataType) -> TypeChange {
        match (previous, self) {
            (a, b) if a == b => TypeChange::Unchanged,
            (DataType::Text { length: old }, DataType::Text { length: new }) if new > old => {
                TypeChange::Widen
            }
            (DataType::Text { .. }, DataType::LongText) => TypeChange::Widen,
            _ => TypeChange::Incompatible,
        }
    }

    /// Coerce a raw JSON value into its storage form. Empty input becomes a typed NULL.
    pub fn coerce(&self, field: &str, raw: &Value) -> Result<BindValue, AppError> {
        if is_empty(raw) {
            return Ok(BindValue::Null(self.value_kind()));
        }
        match self {
            DataType::Text { length } => {
                let s = scalar_to_string(field, raw)?;
                check_length(field, &s, *length)?;
                Ok(BindValue::Text(s))
            }
            DataType::LongText => Ok(BindValue::Text(scalar_to_string(field, raw)?)),
            DataType::FileRef => {
                let s = scalar_to_string(field, raw)?;
                check_length(field, &s, FILE_REF_LENGTH)?;
                Ok(BindValue::Text(s))
            }
            DataType::Number => {
                let n = match raw {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                match n {
                    Some(n) if n.is_finite() => Ok(BindValue::Float(n)),
                    _ => Err(invalid(field, "a number")),
                }
            }
            DataType::Date => {
                let s = raw.as_str().ok_or_else(|| invalid(field, "a date (YYYY-MM-DD)"))?;
                parse_date(s.trim())
                    .map(BindValue::Date)
                    .ok_or_else(|| invalid(field, "a date (YYYY-MM-DD)"))
            }
            DataType::DateTime => {
                let s = raw
                    .as_str()
                    .ok_or_else(|| invalid(field, "a date-time (YYYY-MM-DDTHH:MM:SS)"))?;
                parse_datetime(s.trim())
                    .map(BindValue::DateTime)
                    .ok_or_else(|| invalid(field, "a date-time (YYYY-MM-DDTHH:MM:SS)"))
            }
            DataType::ListRef { .. } => {
                let key = match raw {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                match key {
                    Some(k) if k > 0 => Ok(BindValue::Int(k)),
                    _ => Err(invalid(field, "a list value id")),
                }
            }
        }
    }
}

/// Null, or a string that is blank after trimming.
pub fn is_empty(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn invalid(field: &str, expected: &str) -> AppError {
    AppError::Validation(format!("{} must be {}", field, expected))
}

fn scalar_to_string(field: &str, raw: &Value) -> Result<String, AppError> {
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(invalid(field, "a text value")),
    }
}

fn check_length(field: &str, s: &str, max: u32) -> Result<(), AppError> {
    if s.chars().count() > max as usize {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date()))
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_physical_types() {
        assert_eq!(DataType::Text { length: 100 }.physical_type(), "VARCHAR(100)");
        assert_eq!(DataType::LongText.physical_type(), "TEXT");
        assert_eq!(DataType::Number.physical_type(), "DOUBLE PRECISION");
        assert_eq!(DataType::Date.physical_type(), "DATE");
        assert_eq!(DataType::DateTime.physical_type(), "TIMESTAMP");
        assert_eq!(DataType::ListRef { list_id: 3 }.physical_type(), "BIGINT");
        assert_eq!(DataType::FileRef.physical_type(), "VARCHAR(255)");
    }

    #[test]
    fn test_widening_rules() {
        let t100 = DataType::Text { length: 100 };
        let t255 = DataType::Text { length: 255 };
        assert_eq!(t255.change_from(&t100), TypeChange::Widen);
        assert_eq!(t100.change_from(&t255), TypeChange::Incompatible);
        assert_eq!(t100.change_from(&t100), TypeChange::Unchanged);
        assert_eq!(DataType::LongText.change_from(&t100), TypeChange::Widen);
        assert_eq!(t100.change_from(&DataType::LongText), TypeChange::Incompatible);
        assert_eq!(DataType::Number.change_from(&t100), TypeChange::Incompatible);
        assert_eq!(
            DataType::ListRef { list_id: 2 }.change_from(&DataType::ListRef { list_id: 1 }),
            TypeChange::Incompatible
        );
    }

    #[test]
    fn test_coerce_empty_is_typed_null() {
        let v = DataType::Number.coerce("Weight", &json!("  ")).unwrap();
        assert!(matches!(v, BindValue::Null(ValueKind::Float)));
        let v = DataType::Date.coerce("BirthDate", &Value::Null).unwrap();
        assert!(matches!(v, BindValue::Null(ValueKind::Date)));
    }

    #[test]
    fn test_coerce_number() {
        assert!(matches!(DataType::Number.coerce("Weight", &json!("72.5")), Ok(BindValue::Float(n)) if n == 72.5));
        assert!(matches!(DataType::Number.coerce("Weight", &json!(3)), Ok(BindValue::Float(n)) if n == 3.0));
        let err = DataType::Number.coerce("Weight", &json!("heavy")).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("Weight")));
    }

    #[test]
    fn test_coerce_text_length() {
        let ty = DataType::Text { length: 3 };
        assert!(ty.coerce("Code", &json!("abc")).is_ok());
        assert!(ty.coerce("Code", &json!("ñññ")).is_ok());
        let err = ty.coerce("Code", &json!("abcd")).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("Code")));
        assert!(matches!(ty.coerce("Code", &json!(12)), Ok(BindValue::Text(ref s)) if s == "12"));
        assert!(ty.coerce("Code", &json!({"a": 1})).is_err());
    }

    #[test]
    fn test_coerce_dates() {
        let d = DataType::Date.coerce("BirthDate", &json!("1950-04-02")).unwrap();
        assert_eq!(d.to_json(), json!("1950-04-02"));
        let d = DataType::Date.coerce("BirthDate", &json!("1950-04-02T10:00:00")).unwrap();
        assert_eq!(d.to_json(), json!("1950-04-02"));
        assert!(DataType::Date.coerce("BirthDate", &json!("02/04/1950")).is_err());

        let dt = DataType::DateTime.coerce("VisitAt", &json!("2024-01-05 09:30")).unwrap();
        assert_eq!(dt.to_json(), json!("2024-01-05T09:30:00"));
        let dt = DataType::DateTime.coerce("VisitAt", &json!("2024-01-05T09:30:00+02:00")).unwrap();
        assert_eq!(dt.to_json(), json!("2024-01-05T07:30:00"));
        assert!(DataType::DateTime.coerce("VisitAt", &json!(5)).is_err());
    }

    #[test]
    fn test_coerce_list_ref() {
        let ty = DataType::ListRef { list_id: 1 };
        assert!(matches!(ty.coerce("Status", &json!(7)), Ok(BindValue::Int(7))));
        assert!(matches!(ty.coerce("Status", &json!("7")), Ok(BindValue::Int(7))));
        assert!(ty.coerce("Status", &json!(0)).is_err());
        assert!(ty.coerce("Status", &json!("open")).is_err());
    }

    #[test]
    fn test_validate_definition() {
        assert!(DataType::Text { length: 0 }.validate("Name").is_err());
        assert!(DataType::Text { length: 5000 }.validate("Name").is_err());
        assert!(DataType::Text { length: 100 }.validate("Name").is_ok());
        assert!(DataType::ListRef { list_id: 0 }.validate("Status").is_err());
    }

    #[test]
    fn test_catalog_round_trip() {
        for ty in [
            DataType::Text { length: 40 },
            DataType::LongText,
            DataType::Number,
            DataType::Date,
            DataType::DateTime,
            DataType::ListRef { list_id: 9 },
            DataType::FileRef,
        ] {
            let back = DataType::from_parts(
                ty.tag(),
                ty.text_length().map(|n| n as i32),
                ty.list_id(),
            )
            .unwrap();
            assert_eq!(back, ty);
        }
    }

    #[test]
    fn test_serde_shape() {
        let ty: DataType = serde_json::from_value(json!({"type": "Text", "length": 100})).unwrap();
        assert_eq!(ty, DataType::Text { length: 100 });
        let ty: DataType = serde_json::from_value(json!({"type": "Text"})).unwrap();
        assert_eq!(ty, DataType::Text { length: DEFAULT_TEXT_LENGTH });
        let ty: DataType = serde_json::from_value(json!({"type": "ListRef", "list_id": 4})).unwrap();
        assert_eq!(ty, DataType::ListRef { list_id: 4 });
    }
}
