use chrono::NaiveDateTime;

use crate::error::NativeDiagnostic;
use crate::native::Materialized;
use crate::results::Columns;
use crate::types::RowValues;

use super::params::bind_query_params;
use super::session::MssqlClient;

/// Extract a value from a row at a specific index, `Null` when nothing matches.
#[must_use]
pub fn extract_value(row: &tiberius::Row, idx: usize) -> RowValues {
    if let Ok(Some(val)) = row.try_get::<i32, _>(idx) {
        return RowValues::Int(i64::from(val));
    }
    if let Ok(Some(val)) = row.try_get::<i64, _>(idx) {
        return RowValues::Int(val);
    }
    if let Ok(Some(val)) = row.try_get::<i16, _>(idx) {
        return RowValues::Int(i64::from(val));
    }
    if let Ok(Some(val)) = row.try_get::<u8, _>(idx) {
        return RowValues::Int(i64::from(val));
    }
    if let Ok(Some(val)) = row.try_get::<f32, _>(idx) {
        return RowValues::Float(f64::from(val));
    }
    if let Ok(Some(val)) = row.try_get::<f64, _>(idx) {
        return RowValues::Float(val);
    }
    if let Ok(Some(val)) = row.try_get::<bool, _>(idx) {
        return RowValues::Bool(val);
    }
    if let Ok(Some(val)) = row.try_get::<NaiveDateTime, _>(idx) {
        return RowValues::Timestamp(val);
    }
    if let Ok(Some(val)) = row.try_get::<&str, _>(idx) {
        // datetime values that arrive as text
        if val.contains('-') && (val.contains(':') || val.contains(' ')) {
            if let Ok(dt) = NaiveDateTime::parse_from_str(val, "%Y-%m-%d %H:%M:%S%.f") {
                return RowValues::Timestamp(dt);
            }
        }
        return RowValues::Text(val.to_string());
    }
    if let Ok(Some(val)) = row.try_get::<&[u8], _>(idx) {
        return RowValues::Blob(val.to_vec());
    }
    RowValues::Null
}

/// Run a statement and read its first result into memory.
///
/// Without `params` the SQL is sent as a plain batch; with them it is bound
/// through `sp_executesql`. A statement without a result set reports its row
/// count through a follow-up `@@ROWCOUNT` lookup on the same connection.
///
/// # Errors
/// Returns the native diagnostic if execution or reading the stream fails.
pub async fn materialize(
    client: &mut MssqlClient,
    sql: &str,
    params: Option<&[RowValues]>,
) -> Result<Materialized, NativeDiagnostic> {
    let (names, rows) = {
        let mut stream = match params {
            Some(params) => bind_query_params(sql, params).query(client).await?,
            None => client.simple_query(sql).await?,
        };
        let names: Option<Vec<String>> = stream
            .columns()
            .await?
            .map(|cols| cols.iter().map(|col| col.name().to_string()).collect());
        (names, stream.into_first_result().await?)
    };

    let Some(names) = names else {
        let affected = client
            .simple_query("SELECT CAST(@@ROWCOUNT AS BIGINT)")
            .await?
            .into_row()
            .await?
            .and_then(|row| row.get::<i64, _>(0))
            .unwrap_or(0);
        return Ok(Materialized {
            affected: u64::try_from(affected).unwrap_or(0),
            ..Materialized::default()
        });
    };

    let col_count = names.len();
    let rows = rows
        .iter()
        .map(|row| (0..col_count).map(|i| extract_value(row, i)).collect())
        .collect();
    Ok(Materialized {
        columns: Columns::new(names),
        rows,
        affected: 0,
    })
}
