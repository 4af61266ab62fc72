use std::fmt;

use thiserror::Error;

/// Diagnostic record reported by a native client: vendor code, message and SQLSTATE.
///
/// Wrapped unchanged inside [`SqlAdapterError`] so callers can inspect what the
/// native library said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeDiagnostic {
    pub code: Option<i64>,
    pub message: String,
    pub sqlstate: Option<String>,
}

impl NativeDiagnostic {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            sqlstate: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    /// Success (`00`) and warning (`01`) SQLSTATE classes do not describe a failed statement.
    #[must_use]
    pub fn is_benign_warning(&self) -> bool {
        self.sqlstate
            .as_deref()
            .is_some_and(|state| state.starts_with("00") || state.starts_with("01"))
    }
}

impl fmt::Display for NativeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.sqlstate, self.code) {
            (Some(state), Some(code)) => write!(f, "[{state}] ({code}) {}", self.message),
            (Some(state), None) => write!(f, "[{state}] {}", self.message),
            (None, Some(code)) => write!(f, "({code}) {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for NativeDiagnostic {}

#[derive(Debug, Error)]
pub enum SqlAdapterError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid connection parameters: {0}")]
    InvalidConnectionParameters(String),

    #[error("Connection error: {message}: {diagnostic}")]
    ConnectionError {
        message: String,
        #[source]
        diagnostic: NativeDiagnostic,
    },

    #[error("Query execution error: {diagnostic}")]
    QueryExecution {
        sql: String,
        #[source]
        diagnostic: NativeDiagnostic,
    },

    #[error("Transaction state error: {0}")]
    TransactionState(String),

    #[error("Unbuffered results cannot be rewound for multiple iterations")]
    NonRewindable,

    #[error("Row count is not available in unbuffered result sets")]
    NotCountable,

    #[error("Cannot buffer a result set that has started iteration")]
    Buffering,

    #[error(transparent)]
    Native(#[from] NativeDiagnostic),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),
}

impl SqlAdapterError {
    /// The native diagnostic carried by this error, if any.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&NativeDiagnostic> {
        match self {
            SqlAdapterError::ConnectionError { diagnostic, .. }
            | SqlAdapterError::QueryExecution { diagnostic, .. }
            | SqlAdapterError::Native(diagnostic) => Some(diagnostic),
            _ => None,
        }
    }

    pub(crate) fn query(sql: &str, diagnostic: NativeDiagnostic) -> Self {
        SqlAdapterError::QueryExecution {
            sql: sql.to_string(),
            diagnostic,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for NativeDiagnostic {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message) => NativeDiagnostic {
                code: Some(i64::from(failure.extended_code)),
                message: message.clone().unwrap_or_else(|| failure.to_string()),
                sqlstate: None,
            },
            _ => NativeDiagnostic::new(err.to_string()),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for NativeDiagnostic {
    fn from(err: tokio_postgres::Error) -> Self {
        let sqlstate = err.code().map(|state| state.code().to_string());
        let message = err
            .as_db_error()
            .map_or_else(|| err.to_string(), |db| db.message().to_string());
        NativeDiagnostic {
            code: None,
            message,
            sqlstate,
        }
    }
}

#[cfg(feature = "mssql")]
impl From<tiberius::error::Error> for NativeDiagnostic {
    fn from(err: tiberius::error::Error) -> Self {
        match &err {
            tiberius::error::Error::Server(token) => NativeDiagnostic {
                code: Some(i64::from(token.code())),
                message: token.message().to_string(),
                // severity 10 and below is informational on SQL Server
                sqlstate: (token.class() <= 10).then(|| "01000".to_string()),
            },
            _ => NativeDiagnostic::new(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_warning_classes() {
        let state = |sqlstate: &str| NativeDiagnostic::new("diag").with_sqlstate(sqlstate);
        assert!(state("01000").is_benign_warning());
        assert!(state("00000").is_benign_warning());
        assert!(!state("42S02").is_benign_warning());
        assert!(!NativeDiagnostic::new("no state").is_benign_warning());
    }

    #[test]
    fn query_errors_keep_the_diagnostic() {
        let diag = NativeDiagnostic::new("no such table: t")
            .with_code(1)
            .with_sqlstate("42S02");
        let err = SqlAdapterError::query("select * from t", diag.clone());
        assert_eq!(err.diagnostic(), Some(&diag));
        assert_eq!(
            err.to_string(),
            "Query execution error: [42S02] (1) no such table: t"
        );
    }
}
