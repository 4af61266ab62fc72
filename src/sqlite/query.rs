use rusqlite::Statement;
use rusqlite::types::Value;

use crate::error::NativeDiagnostic;
use crate::native::Materialized;
use crate::results::Columns;
use crate::types::RowValues;

use super::params::Params;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns the native diagnostic if the value cannot be read.
pub fn sqlite_extract_value(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<RowValues, NativeDiagnostic> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Run a prepared statement to completion.
///
/// Statements without result columns report the number of changed rows;
/// everything else is read into memory.
///
/// # Errors
/// Returns the native diagnostic if execution or row extraction fails.
pub fn materialize(
    stmt: &mut Statement<'_>,
    params: &[RowValues],
) -> Result<Materialized, NativeDiagnostic> {
    let params = Params::convert(params);
    let param_refs = params.as_refs();

    if stmt.column_count() == 0 {
        let affected = stmt.execute(&param_refs[..])?;
        return Ok(Materialized {
            affected: affected as u64,
            ..Materialized::default()
        });
    }

    let columns = Columns::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    );
    let col_count = columns.len();

    let mut rows = Vec::new();
    let mut rows_iter = stmt.query(&param_refs[..])?;
    while let Some(row) = rows_iter.next()? {
        let mut values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            values.push(sqlite_extract_value(row, i)?);
        }
        rows.push(values);
    }

    Ok(Materialized {
        columns,
        rows,
        affected: 0,
    })
}
