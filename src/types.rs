use std::fmt;

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// Values that can be stored in a database row or used as statement parameters.
///
/// The same enum is produced by every native backend so callers never branch on
/// driver types:
/// ```rust
/// use sql_adapter::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(dt);
                }
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

/// Backend identifier used to pick the connection-string grammar, the quoting
/// dialect and the native driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Backend {
    /// MySQL wire protocol
    Mysql,
    /// `SQLite` file or in-memory database
    Sqlite,
    /// SQL Server through the `sqlsrv` grammar
    Sqlsrv,
    /// SQL Server / Sybase through the `dblib` grammar
    Dblib,
    /// `PostgreSQL`
    Pgsql,
    /// Any other identifier, kept verbatim
    Other(String),
}

impl Backend {
    /// Resolve a backend from an identifier such as `pgsql`, `Pdo_Sqlite` or `postgres`.
    ///
    /// A leading `pdo_` is ignored and matching is case-insensitive.
    #[must_use]
    pub fn from_name(name: &str) -> Backend {
        let lowered = name.trim().to_ascii_lowercase();
        let lowered = lowered.strip_prefix("pdo_").unwrap_or(&lowered);
        match lowered {
            "mysql" | "mysqli" | "mariadb" => Backend::Mysql,
            "sqlite" | "sqlite3" => Backend::Sqlite,
            "sqlsrv" | "mssql" | "sqlserver" => Backend::Sqlsrv,
            "dblib" => Backend::Dblib,
            "pgsql" | "postgres" | "postgresql" => Backend::Pgsql,
            other => Backend::Other(other.to_string()),
        }
    }

    /// The identifier written as the connection-string prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Backend::Mysql => "mysql",
            Backend::Sqlite => "sqlite",
            Backend::Sqlsrv => "sqlsrv",
            Backend::Dblib => "dblib",
            Backend::Pgsql => "pgsql",
            Backend::Other(name) => name,
        }
    }

    /// Backends whose generated values only come from named sequences.
    #[must_use]
    pub fn requires_sequence_name(&self) -> bool {
        matches!(self, Backend::Pgsql)
    }

    /// Both SQL Server grammars speak TDS.
    #[must_use]
    pub fn is_sql_server(&self) -> bool {
        matches!(self, Backend::Sqlsrv | Backend::Dblib)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
