//! Typed parameter values and their binding onto sqlx queries.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::{Query, QueryAs};

/// Storage kind, so a NULL can still be bound with the right type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Float,
    Text,
    Date,
    DateTime,
}

/// A value bound as a query parameter. Never rendered into SQL text.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Null(ValueKind),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl BindValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null(_))
    }

    /// JSON form, identical to what a read of the stored column yields.
    pub fn to_json(&self) -> Value {
        match self {
            BindValue::Null(_) => Value::Null,
            BindValue::Int(n) => Value::Number((*n).into()),
            BindValue::Float(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            BindValue::Text(s) => Value::String(s.clone()),
            BindValue::Date(d) => Value::String(format_date(d)),
            BindValue::DateTime(dt) => Value::String(format_datetime(dt)),
        }
    }
}

pub fn format_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// Bind every parameter in order.
pub fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[BindValue],
) -> Query<'q, Postgres, PgArguments> {
    for p in params {
        query = match p {
            BindValue::Null(ValueKind::Int) => query.bind(None::<i64>),
            BindValue::Null(ValueKind::Float) => query.bind(None::<f64>),
            BindValue::Null(ValueKind::Text) => query.bind(None::<String>),
            BindValue::Null(ValueKind::Date) => query.bind(None::<NaiveDate>),
            BindValue::Null(ValueKind::DateTime) => query.bind(None::<NaiveDateTime>),
            BindValue::Int(n) => query.bind(*n),
            BindValue::Float(n) => query.bind(*n),
            BindValue::Text(s) => query.bind(s.clone()),
            BindValue::Date(d) => query.bind(*d),
            BindValue::DateTime(dt) => query.bind(*dt),
        };
    }
    query
}

/// `bind_all` for typed row decoding.
pub fn bind_all_as<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    params: &[BindValue],
) -> QueryAs<'q, Postgres, O, PgArguments> {
    for p in params {
        query = match p {
            BindValue::Null(ValueKind::Int) => query.bind(None::<i64>),
            BindValue::Null(ValueKind::Float) => query.bind(None::<f64>),
            BindValue::Null(ValueKind::Text) => query.bind(None::<String>),
            BindValue::Null(ValueKind::Date) => query.bind(None::<NaiveDate>),
            BindValue::Null(ValueKind::DateTime) => query.bind(None::<NaiveDateTime>),
            BindValue::Int(n) => query.bind(*n),
            BindValue::Float(n) => query.bind(*n),
            BindValue::Text(s) => query.bind(s.clone()),
            BindValue::Date(d) => query.bind(*d),
            BindValue::DateTime(dt) => query.bind(*dt),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_json_forms() {
        assert_eq!(BindValue::Int(4).to_json(), json!(4));
        assert_eq!(BindValue::Float(1.5).to_json(), json!(1.5));
        assert_eq!(BindValue::Text("a".into()).to_json(), json!("a"));
        assert_eq!(BindValue::Null(ValueKind::Text).to_json(), Value::Null);
        let d = NaiveDate::from_ymd_opt(2020, 2, 29).unwrap();
        assert_eq!(BindValue::Date(d).to_json(), json!("2020-02-29"));
        let dt = d.and_hms_milli_opt(8, 5, 0, 250).unwrap();
        assert_eq!(BindValue::DateTime(dt).to_json(), json!("2020-02-29T08:05:00.250"));
    }

    #[test]
    fn test_is_null() {
        assert!(BindValue::Null(ValueKind::Date).is_null());
        assert!(!BindValue::Int(0).is_null());
    }
}
