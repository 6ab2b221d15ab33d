//! Column type mapping and value conversion.
//!
//! Field values cross the store boundary as JSON values; this module
//! converts them to and from the typed physical columns. The
//! `ColumnType` match arms are exhaustive on purpose: a new column
//! type that reaches the mapper without a physical mapping is a build
//! error, not a runtime assertion.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use tablemirror_types::record::{ChangeMeta, Fields, StoredRecord};
use tablemirror_types::spec::{ColumnSpec, ColumnType, TableSpec};

use crate::error::{Result, StoreError};
use crate::ident::quote;

/// Physical SQL type for a declared column type.
pub(crate) fn sql_type(data_type: ColumnType) -> &'static str {
    match data_type {
        ColumnType::Text => "TEXT",
        ColumnType::TextArray => "TEXT[]",
        ColumnType::Number => "DOUBLE PRECISION",
        ColumnType::NumberArray => "DOUBLE PRECISION[]",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::BooleanArray => "BOOLEAN[]",
        ColumnType::Json => "JSONB",
    }
}

/// Current UTC time, RFC 3339 with fixed millisecond precision.
///
/// Fixed width keeps lexicographic order equal to chronological order
/// for the keep-latest merge in [`ChangeMeta`].
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Check that every field key names a declared column.
///
/// Fail-closed: one unknown key rejects the whole batch before any
/// row is written.
pub(crate) fn validate_fields(table: &TableSpec, fields: &Fields) -> Result<()> {
    for key in fields.keys() {
        if !table.has_column(key) {
            return Err(StoreError::UnknownColumn {
                table: table.name.clone(),
                column: key.clone(),
            });
        }
    }
    Ok(())
}

fn type_err(column: &ColumnSpec) -> StoreError {
    StoreError::ValueType {
        column: column.id.clone(),
        expected: sql_type(column.data_type),
    }
}

fn to_text(column: &ColumnSpec, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(ToOwned::to_owned)
        .ok_or_else(|| type_err(column))
}

fn to_number(column: &ColumnSpec, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| type_err(column))
}

fn to_boolean(column: &ColumnSpec, value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| type_err(column))
}

fn to_array<T>(
    column: &ColumnSpec,
    value: &Value,
    element: impl Fn(&ColumnSpec, &Value) -> Result<T>,
) -> Result<Vec<T>> {
    let items = value.as_array().ok_or_else(|| type_err(column))?;
    items.iter().map(|v| element(column, v)).collect()
}

/// Bind one JSON field value to the query as the column's physical
/// type. `None` and JSON `null` both bind SQL NULL.
pub(crate) fn bind_field<'q>(
    query: Query<'q, Postgres, PgArguments>,
    column: &ColumnSpec,
    value: Option<&Value>,
) -> Result<Query<'q, Postgres, PgArguments>> {
    let value = value.filter(|v| !v.is_null());
    let query = match column.data_type {
        ColumnType::Text => {
            let v = value.map(|v| to_text(column, v)).transpose()?;
            query.bind(v)
        }
        ColumnType::TextArray => {
            let v = value.map(|v| to_array(column, v, to_text)).transpose()?;
            query.bind(v)
        }
        ColumnType::Number => {
            let v = value.map(|v| to_number(column, v)).transpose()?;
            query.bind(v)
        }
        ColumnType::NumberArray => {
            let v = value.map(|v| to_array(column, v, to_number)).transpose()?;
            query.bind(v)
        }
        ColumnType::Boolean => {
            let v = value.map(|v| to_boolean(column, v)).transpose()?;
            query.bind(v)
        }
        ColumnType::BooleanArray => {
            let v = value.map(|v| to_array(column, v, to_boolean)).transpose()?;
            query.bind(v)
        }
        ColumnType::Json => query.bind(value.cloned()),
    };
    Ok(query)
}

/// Read one declared column from a row back into a JSON value.
pub(crate) fn read_field(row: &PgRow, column: &ColumnSpec) -> Result<Value> {
    let name = column.id.as_str();
    let value = match column.data_type {
        ColumnType::Text => row
            .try_get::<Option<String>, _>(name)?
            .map_or(Value::Null, Value::String),
        ColumnType::TextArray => row
            .try_get::<Option<Vec<String>>, _>(name)?
            .map_or(Value::Null, |items| {
                Value::Array(items.into_iter().map(Value::String).collect())
            }),
        ColumnType::Number => row
            .try_get::<Option<f64>, _>(name)?
            .map_or(Value::Null, Value::from),
        ColumnType::NumberArray => row
            .try_get::<Option<Vec<f64>>, _>(name)?
            .map_or(Value::Null, |items| {
                Value::Array(items.into_iter().map(Value::from).collect())
            }),
        ColumnType::Boolean => row
            .try_get::<Option<bool>, _>(name)?
            .map_or(Value::Null, Value::Bool),
        ColumnType::BooleanArray => row
            .try_get::<Option<Vec<bool>>, _>(name)?
            .map_or(Value::Null, |items| {
                Value::Array(items.into_iter().map(Value::Bool).collect())
            }),
        ColumnType::Json => row
            .try_get::<Option<Value>, _>(name)?
            .unwrap_or(Value::Null),
    };
    Ok(value)
}

/// Quoted select list: store-managed columns plus every declared one.
pub(crate) fn select_list(table: &TableSpec) -> String {
    let mut parts = vec![
        quote("ws_id"),
        quote("id"),
        quote("change_meta"),
        quote("dirty"),
    ];
    parts.extend(table.columns.iter().map(|c| quote(&c.id)));
    parts.join(", ")
}

/// Decode a full row (as selected by [`select_list`]) into a record.
pub(crate) fn decode_record(row: &PgRow, table: &TableSpec) -> Result<StoredRecord> {
    let mut fields = Fields::new();
    for column in &table.columns {
        fields.insert(column.id.clone(), read_field(row, column)?);
    }
    let meta: ChangeMeta = serde_json::from_value(row.try_get::<Value, _>("change_meta")?)?;
    Ok(StoredRecord {
        ws_id: row.try_get("ws_id")?,
        remote_id: row.try_get("id")?,
        fields,
        meta,
        dirty: row.try_get("dirty")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tablemirror_types::spec::ColumnSpec;

    #[test]
    fn sql_type_covers_all_variants() {
        assert_eq!(sql_type(ColumnType::Text), "TEXT");
        assert_eq!(sql_type(ColumnType::TextArray), "TEXT[]");
        assert_eq!(sql_type(ColumnType::Number), "DOUBLE PRECISION");
        assert_eq!(sql_type(ColumnType::NumberArray), "DOUBLE PRECISION[]");
        assert_eq!(sql_type(ColumnType::Boolean), "BOOLEAN");
        assert_eq!(sql_type(ColumnType::BooleanArray), "BOOLEAN[]");
        assert_eq!(sql_type(ColumnType::Json), "JSONB");
    }

    #[test]
    fn now_iso_is_fixed_width_utc() {
        let ts = now_iso();
        // e.g. 2026-08-30T12:34:56.789Z
        assert_eq!(ts.len(), 24, "got: {ts}");
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn validate_fields_rejects_unknown_key() {
        let table = TableSpec::new("tasks", vec![ColumnSpec::new("title", ColumnType::Text)]);
        let fields = Fields::from([("ghost".to_string(), json!("x"))]);
        let err = validate_fields(&table, &fields).unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }), "got: {err}");
    }

    #[test]
    fn validate_fields_accepts_declared_keys() {
        let table = TableSpec::new("tasks", vec![ColumnSpec::new("title", ColumnType::Text)]);
        let fields = Fields::from([("title".to_string(), json!("x"))]);
        assert!(validate_fields(&table, &fields).is_ok());
    }

    #[test]
    fn bind_field_rejects_type_mismatch() {
        let column = ColumnSpec::new("count", ColumnType::Number);
        let query = sqlx::query("SELECT $1");
        let err = bind_field(query, &column, Some(&json!("not a number")))
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::ValueType { .. }), "got: {err}");
    }

    #[test]
    fn bind_field_rejects_mixed_array() {
        let column = ColumnSpec::new("tags", ColumnType::TextArray);
        let query = sqlx::query("SELECT $1");
        let err = bind_field(query, &column, Some(&json!(["a", 1]))).err().unwrap();
        assert!(matches!(err, StoreError::ValueType { .. }), "got: {err}");
    }

    #[test]
    fn bind_field_accepts_null_for_any_type() {
        for data_type in [
            ColumnType::Text,
            ColumnType::TextArray,
            ColumnType::Number,
            ColumnType::NumberArray,
            ColumnType::Boolean,
            ColumnType::BooleanArray,
            ColumnType::Json,
        ] {
            let column = ColumnSpec::new("c", data_type);
            let query = sqlx::query("SELECT $1");
            assert!(bind_field(query, &column, Some(&Value::Null)).is_ok());
        }
    }

    #[test]
    fn select_list_orders_managed_columns_first() {
        let table = TableSpec::new(
            "tasks",
            vec![
                ColumnSpec::new("title", ColumnType::Text),
                ColumnSpec::new("done", ColumnType::Boolean),
            ],
        );
        assert_eq!(
            select_list(&table),
            "\"ws_id\", \"id\", \"change_meta\", \"dirty\", \"title\", \"done\""
        );
    }
}
