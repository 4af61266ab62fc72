use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::NativeDiagnostic;
use crate::results::Columns;
use crate::types::RowValues;

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns the native diagnostic if the column cannot be retrieved.
pub fn postgres_extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<RowValues, NativeDiagnostic> {
    let type_info = row.columns()[idx].type_();

    Ok(match type_info.name() {
        "int2" => {
            let val: Option<i16> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Int)
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v)))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Float)
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Bool)
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Timestamp)
        }
        "timestamptz" => {
            let val: Option<DateTime<Utc>> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc()))
        }
        "date" => {
            let val: Option<NaiveDate> = row.try_get(idx)?;
            val.and_then(|d| d.and_hms_opt(0, 0, 0))
                .map_or(RowValues::Null, RowValues::Timestamp)
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::JSON)
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Blob)
        }
        // text, varchar, bpchar, name and anything else readable as a string
        _ => {
            let val: Option<String> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Text)
        }
    })
}

/// Column names of a prepared statement.
#[must_use]
pub fn statement_columns(stmt: &tokio_postgres::Statement) -> Columns {
    let names = stmt.columns().iter().map(|c| c.name().to_string()).collect();
    Columns::new(names)
}

/// Read every value of a row.
///
/// # Errors
/// Returns the native diagnostic if a column cannot be retrieved.
pub fn row_values(row: &tokio_postgres::Row) -> Result<Vec<RowValues>, NativeDiagnostic> {
    (0..row.len())
        .map(|i| postgres_extract_value(row, i))
        .collect()
}
