use std::fmt;

use crate::config::ConnectionParameters;
use crate::error::SqlAdapterError;
use crate::types::Backend;

/// Backend-specific connection string: `<backend>:<body>`.
///
/// `SQLite` bodies are a bare path; every other backend uses `key=value` pairs
/// separated by `;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    backend: Backend,
    body: String,
}

impl Dsn {
    /// Parse a caller-supplied connection string such as `pgsql:host=db;dbname=app`.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::InvalidConnectionParameters` if no backend prefix is present.
    pub fn parse(input: &str) -> Result<Self, SqlAdapterError> {
        match input.split_once(':') {
            Some((prefix, body)) if !prefix.trim().is_empty() => Ok(Self {
                backend: Backend::from_name(prefix),
                body: body.to_string(),
            }),
            _ => Err(SqlAdapterError::InvalidConnectionParameters(format!(
                "the dsn `{input}` does not name a backend"
            ))),
        }
    }

    /// Build the connection string for the normalized parameters.
    ///
    /// An explicit `dsn` is used verbatim; otherwise the backend from the
    /// `driver` key selects the grammar.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::InvalidConnectionParameters` if the parameters are
    /// contradictory or no backend can be derived.
    pub fn from_parameters(params: &ConnectionParameters) -> Result<Self, SqlAdapterError> {
        params.validate()?;

        if let Some(dsn) = &params.dsn {
            return Self::parse(dsn);
        }

        let backend = params.backend().ok_or_else(|| {
            SqlAdapterError::InvalidConnectionParameters(
                "a dsn was not provided or could not be constructed from the parameters"
                    .to_string(),
            )
        })?;

        let body = match backend {
            Backend::Sqlite => params.database.clone().unwrap_or_default(),
            Backend::Sqlsrv => join_pairs(&[
                ("database", params.database.clone()),
                ("server", params.host.clone()),
            ]),
            ref other => join_pairs(&[
                ("dbname", params.database.clone()),
                ("host", params.host.clone()),
                ("port", params.port.map(|p| p.to_string())),
                // the postgres wire protocol negotiates encoding on its own
                (
                    "charset",
                    params.charset.clone().filter(|_| *other != Backend::Pgsql),
                ),
                ("unix_socket", params.unix_socket.clone()),
                ("version", params.version.clone()),
            ]),
        };

        Ok(Self { backend, body })
    }

    #[must_use]
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// `key=value` pairs of the body, in order. Empty for `SQLite`.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        if self.backend == Backend::Sqlite {
            return Vec::new();
        }
        self.body
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect()
    }

    /// Value of one body key, compared case-insensitively.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs()
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.body)
    }
}

fn join_pairs(pairs: &[(&str, Option<String>)]) -> String {
    pairs
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| format!("{key}={v}")))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(driver: &str) -> ConnectionParameters {
        ConnectionParameters::new()
            .with_driver(driver)
            .with_database("app")
            .with_host("db.local")
            .with_port(4000)
            .with_charset("utf8")
            .with_version("8")
    }

    #[test]
    fn sqlite_takes_a_bare_path() {
        let params = ConnectionParameters::new()
            .with_driver("sqlite")
            .with_database("/var/data/app.db");
        let dsn = Dsn::from_parameters(&params).unwrap();
        assert_eq!(dsn.to_string(), "sqlite:/var/data/app.db");
        assert!(dsn.pairs().is_empty());
    }

    #[test]
    fn sqlsrv_takes_database_and_server() {
        let dsn = Dsn::from_parameters(&full("sqlsrv")).unwrap();
        assert_eq!(dsn.to_string(), "sqlsrv:database=app;server=db.local");
    }

    #[test]
    fn mysql_keeps_charset() {
        let dsn = Dsn::from_parameters(&full("mysql")).unwrap();
        assert_eq!(
            dsn.to_string(),
            "mysql:dbname=app;host=db.local;port=4000;charset=utf8;version=8"
        );
    }

    #[test]
    fn pgsql_drops_charset() {
        let dsn = Dsn::from_parameters(&full("pgsql")).unwrap();
        assert_eq!(
            dsn.to_string(),
            "pgsql:dbname=app;host=db.local;port=4000;version=8"
        );
        assert_eq!(dsn.get("HOST"), Some("db.local"));
    }

    #[test]
    fn dblib_uses_the_generic_grammar() {
        let dsn = Dsn::from_parameters(&full("dblib")).unwrap();
        assert_eq!(
            dsn.to_string(),
            "dblib:dbname=app;host=db.local;port=4000;charset=utf8;version=8"
        );
    }

    #[test]
    fn socket_is_emitted_for_generic_backends() {
        let params = ConnectionParameters::new()
            .with_driver("mysql")
            .with_database("app")
            .with_unix_socket("/run/mysqld.sock");
        let dsn = Dsn::from_parameters(&params).unwrap();
        assert_eq!(
            dsn.to_string(),
            "mysql:dbname=app;unix_socket=/run/mysqld.sock"
        );
    }

    #[test]
    fn explicit_dsn_is_verbatim() {
        let params = ConnectionParameters::new().with_dsn("sqlite::memory:");
        let dsn = Dsn::from_parameters(&params).unwrap();
        assert_eq!(dsn.backend(), &Backend::Sqlite);
        assert_eq!(dsn.body(), ":memory:");
    }

    #[test]
    fn missing_backend_is_rejected() {
        let params = ConnectionParameters::new().with_host("db");
        assert!(matches!(
            Dsn::from_parameters(&params),
            Err(SqlAdapterError::InvalidConnectionParameters(_))
        ));
        assert!(Dsn::parse("no-prefix").is_err());
    }
}
