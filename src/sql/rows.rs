//! Decode dynamic rows into JSON objects.

use crate::sql::params::{format_date, format_datetime};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};

/// One object per row; `key` maps each column alias to its JSON key.
pub fn row_to_json(row: &PgRow, key: impl Fn(&str) -> String) -> Value {
    let mut map = Map::new();
    for (idx, col) in row.columns().iter().enumerate() {
        map.insert(key(col.name()), cell_to_value(row, idx));
    }
    Value::Object(map)
}

/// Decode one cell by its PostgreSQL type. Unknown types fall back to text.
pub fn cell_to_value(row: &PgRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_info().name().to_ascii_uppercase();
    match type_name.as_str() {
        "INT2" => opt(row.try_get::<Option<i16>, _>(idx), |n| Value::Number(n.into())),
        "INT4" => opt(row.try_get::<Option<i32>, _>(idx), |n| Value::Number(n.into())),
        "INT8" => opt(row.try_get::<Option<i64>, _>(idx), |n| Value::Number(n.into())),
        "FLOAT4" => opt(row.try_get::<Option<f32>, _>(idx), |n| float(n as f64)),
        "FLOAT8" => opt(row.try_get::<Option<f64>, _>(idx), float),
        "BOOL" => opt(row.try_get::<Option<bool>, _>(idx), Value::Bool),
        "DATE" => opt(row.try_get::<Option<chrono::NaiveDate>, _>(idx), |d| {
            Value::String(format_date(&d))
        }),
        "TIMESTAMP" => opt(row.try_get::<Option<chrono::NaiveDateTime>, _>(idx), |d| {
            Value::String(format_datetime(&d))
        }),
        "TIMESTAMPTZ" => opt(
            row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx),
            |d| Value::String(d.to_rfc3339()),
        ),
        "JSON" | "JSONB" => opt(row.try_get::<Option<Value>, _>(idx), |v| v),
        _ => opt(row.try_get::<Option<String>, _>(idx), Value::String),
    }
}

fn opt<T>(res: Result<Option<T>, sqlx::Error>, f: impl FnOnce(T) -> Value) -> Value {
    match res {
        Ok(Some(v)) => f(v),
        Ok(None) => Value::Null,
        Err(e) => {
            tracing::debug!(error = %e, "undecodable cell");
            Value::Null
        }
    }
}

fn float(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
