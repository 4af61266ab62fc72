use rusqlite::types::Value;

use crate::types::RowValues;

/// Convert a single `RowValues` to a rusqlite `Value`.
///
/// `SQLite` has no boolean, timestamp or JSON storage class: booleans become
/// integers, timestamps ISO-8601 text and JSON its serialized text.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Unified `SQLite` parameter container.
pub struct Params(pub Vec<Value>);

impl Params {
    #[must_use]
    pub fn convert(params: &[RowValues]) -> Self {
        Params(params.iter().map(row_value_to_sqlite_value).collect())
    }

    /// Build a borrowed params slice suitable for rusqlite execution.
    #[must_use]
    pub fn as_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.0.iter().map(|v| v as &dyn rusqlite::ToSql).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn values_map_to_storage_classes() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let params = Params::convert(&[
            RowValues::Bool(true),
            RowValues::Timestamp(ts),
            RowValues::JSON(serde_json::json!({"a": 1})),
            RowValues::Null,
        ]);
        assert_eq!(
            params.0,
            vec![
                Value::Integer(1),
                Value::Text("2024-05-01 12:30:00".to_string()),
                Value::Text(r#"{"a":1}"#.to_string()),
                Value::Null,
            ]
        );
        assert_eq!(params.as_refs().len(), 4);
    }
}
