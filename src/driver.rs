//! Facade tying a [`Connection`] to the quoting [`Platform`] of its backend.

use crate::config::ConnectionParameters;
use crate::connection::Connection;
use crate::error::SqlAdapterError;
use crate::native::NativeDriver;
use crate::platform::Platform;
use crate::results::ResultSet;
use crate::statement::Statement;
use crate::types::{Backend, RowValues};

/// How a backend expects parameter placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareType {
    Positional,
    Named,
}

/// Spelling used by [`Driver::database_platform_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameFormat {
    /// `PostgreSQL`, `SQLServer`
    #[default]
    Camelcase,
    /// `PostgreSQL`, `SQL Server`
    Natural,
}

/// Entry point for running SQL against one backend.
///
/// ```rust
/// use sql_adapter::native::memory::MemoryDriver;
/// use sql_adapter::prelude::*;
///
/// let params = ConnectionParameters::new().with_driver("pgsql").with_database("app");
/// let mut driver = Driver::with_native(params, Box::new(MemoryDriver::new("pgsql")));
/// assert_eq!(driver.format_parameter_name(None, 2), "$2");
/// assert_eq!(driver.quote_identifier_chain(["public", "users"]), "\"public\".\"users\"");
/// driver.query("SELECT 1")?;
/// assert_eq!(driver.database_platform_name(NameFormat::Natural), "PostgreSQL");
/// # Ok::<(), SqlAdapterError>(())
/// ```
#[derive(Debug)]
pub struct Driver {
    connection: Connection,
}

impl Driver {
    #[must_use]
    pub fn new(parameters: ConnectionParameters) -> Self {
        Self::from_connection(Connection::new(parameters))
    }

    #[must_use]
    pub fn with_native(parameters: ConnectionParameters, native: Box<dyn NativeDriver>) -> Self {
        Self::from_connection(Connection::with_native(parameters, native))
    }

    #[must_use]
    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    #[must_use]
    pub fn into_connection(self) -> Connection {
        self.connection
    }

    /// Quoting rules for the connection's current backend.
    ///
    /// Derived on every call, so it follows the backend reported by the live
    /// session once a connect has happened.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.connection
            .backend()
            .map(Platform::for_backend)
            .unwrap_or_default()
    }

    /// # Errors
    /// See [`Connection::execute`].
    pub fn query(&mut self, sql: &str) -> Result<ResultSet<'static>, SqlAdapterError> {
        self.connection.execute(sql)
    }

    /// # Errors
    /// See [`Connection::prepare`].
    pub fn prepare(&mut self, sql: &str) -> Result<Statement, SqlAdapterError> {
        self.connection.prepare(sql)
    }

    /// # Errors
    /// See [`Connection::execute_prepared`].
    pub fn execute_prepared<'s>(
        &mut self,
        statement: &'s mut Statement,
        params: &[RowValues],
    ) -> Result<ResultSet<'s>, SqlAdapterError> {
        self.connection.execute_prepared(statement, params)
    }

    pub fn last_generated_value(&mut self, name: Option<&str>) -> Option<RowValues> {
        self.connection.last_generated_value(name)
    }

    #[must_use]
    pub fn quote_value(&self, value: &str) -> String {
        self.platform()
            .with_connection(&self.connection)
            .quote_value(value)
    }

    #[must_use]
    pub fn quote_trusted_value(&self, value: &str) -> String {
        self.platform()
            .with_connection(&self.connection)
            .quote_trusted_value(value)
    }

    #[must_use]
    pub fn quote_identifier_chain<I, S>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.platform().quote_identifier_chain(parts)
    }

    #[must_use]
    pub fn prepare_type(&self) -> PrepareType {
        match self.connection.backend() {
            Some(Backend::Sqlite) => PrepareType::Named,
            _ => PrepareType::Positional,
        }
    }

    /// Placeholder for the parameter at 1-based `position`, or named `name`.
    #[must_use]
    pub fn format_parameter_name(&self, name: Option<&str>, position: usize) -> String {
        let named = name.filter(|n| !n.is_empty() && !n.bytes().all(|b| b.is_ascii_digit()));
        if self.prepare_type() == PrepareType::Named
            && let Some(name) = named
        {
            return format!(":{name}");
        }
        match self.connection.backend() {
            Some(Backend::Pgsql) => format!("${position}"),
            Some(backend) if backend.is_sql_server() => format!("@P{position}"),
            _ => "?".to_string(),
        }
    }

    #[must_use]
    pub fn database_platform_name(&self, format: NameFormat) -> String {
        let Some(backend) = self.connection.backend() else {
            return self.platform().name().to_string();
        };
        match (backend, format) {
            (Backend::Sqlsrv | Backend::Dblib, NameFormat::Natural) => "SQL Server".to_string(),
            (Backend::Other(name), NameFormat::Camelcase) => {
                let mut chars = name.chars();
                chars
                    .next()
                    .map(|first| first.to_uppercase().chain(chars).collect())
                    .unwrap_or_default()
            }
            (Backend::Other(name), NameFormat::Natural) => name.clone(),
            (backend, _) => Platform::for_backend(backend).name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::memory::MemoryDriver;
    use crate::platform::Dialect;

    fn driver(backend: &str) -> Driver {
        let params = ConnectionParameters::new()
            .with_driver(backend)
            .with_database("app");
        Driver::with_native(params, Box::new(MemoryDriver::new(backend)))
    }

    #[test]
    fn placeholders_follow_the_backend() {
        assert_eq!(driver("sqlite").format_parameter_name(Some("id"), 1), ":id");
        assert_eq!(driver("sqlite").format_parameter_name(None, 1), "?");
        assert_eq!(driver("sqlite").format_parameter_name(Some("3"), 3), "?");
        assert_eq!(driver("mysql").format_parameter_name(Some("id"), 1), "?");
        assert_eq!(driver("pgsql").format_parameter_name(Some("id"), 4), "$4");
        assert_eq!(driver("sqlsrv").format_parameter_name(None, 2), "@P2");
        assert_eq!(driver("mysql").prepare_type(), PrepareType::Positional);
    }

    #[test]
    fn platform_names() {
        assert_eq!(
            driver("sqlsrv").database_platform_name(NameFormat::Natural),
            "SQL Server"
        );
        assert_eq!(
            driver("dblib").database_platform_name(NameFormat::Camelcase),
            "SQLServer"
        );
        assert_eq!(
            driver("mysql").database_platform_name(NameFormat::Natural),
            "MySQL"
        );
        assert_eq!(
            driver("oci").database_platform_name(NameFormat::Camelcase),
            "Oci"
        );
    }

    #[test]
    fn platform_is_resynced_after_connect() {
        let params = ConnectionParameters::new()
            .with_driver("sqlite")
            .with_database(":memory:");
        let mut driver = Driver::with_native(params, Box::new(MemoryDriver::new("mysql")));
        assert_eq!(driver.platform().dialect(), Dialect::Sqlite);
        driver.query("SELECT 1").unwrap();
        assert_eq!(driver.platform().dialect(), Dialect::Mysql);
        assert_eq!(driver.quote_identifier_chain(["a`b", "c"]), "`a``b`.`c`");
    }

    #[test]
    fn value_quoting_uses_native_escaping_once_connected() {
        let params = ConnectionParameters::new()
            .with_driver("sqlite")
            .with_database(":memory:");
        let mut driver = Driver::with_native(
            params,
            Box::new(MemoryDriver::new("sqlite").with_native_escaping()),
        );
        assert_eq!(driver.quote_trusted_value("it's"), r"'it\'s'");
        driver.connection_mut().connect().unwrap();
        assert_eq!(driver.quote_value("it's"), "'it''s'");
        assert_eq!(
            driver.quote_trusted_value("it's"),
            driver.quote_value("it's")
        );
    }
}
