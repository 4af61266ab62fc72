use std::collections::BTreeMap;

use serde::Deserialize;
use serde::de::{self, Deserializer};
use serde_json::Value as JsonValue;

use crate::error::SqlAdapterError;
use crate::types::Backend;

/// Normalized connection configuration.
///
/// Deserializes from the usual mapping keys and their aliases
/// (`hostname`, `uid`, `pwd`, `dbname`, `pdodriver`, `options`, ...). Keys that
/// are not recognized are kept in [`extra`](Self::extra) and handed to the
/// native driver as backend options instead of being rejected.
///
/// ```rust
/// use sql_adapter::prelude::*;
///
/// let params = ConnectionParameters::from_json(
///     r#"{"pdodriver": "pgsql", "hostname": "db", "dbname": "app", "port": "5432"}"#,
/// )?;
/// assert_eq!(params.host.as_deref(), Some("db"));
/// assert_eq!(params.port, Some(5432));
/// # Ok::<(), SqlAdapterError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionParameters {
    #[serde(alias = "hostname")]
    pub host: Option<String>,
    #[serde(alias = "uid", alias = "user")]
    pub username: Option<String>,
    #[serde(alias = "pwd")]
    pub password: Option<String>,
    #[serde(alias = "dbname")]
    pub database: Option<String>,
    pub charset: Option<String>,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    pub unix_socket: Option<String>,
    pub version: Option<String>,
    /// Backend identifier such as `pgsql` or `Pdo_Sqlite`.
    #[serde(alias = "pdodriver")]
    pub driver: Option<String>,
    /// Complete connection string; used verbatim when present.
    pub dsn: Option<String>,
    #[serde(alias = "options")]
    pub driver_options: BTreeMap<String, JsonValue>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl ConnectionParameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object into connection parameters.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::InvalidArgument` if the input is not a valid mapping.
    pub fn from_json(input: &str) -> Result<Self, SqlAdapterError> {
        serde_json::from_str(input).map_err(|e| {
            SqlAdapterError::InvalidArgument(format!("invalid connection parameters: {e}"))
        })
    }

    /// Convert an already-parsed JSON value into connection parameters.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::InvalidArgument` if the value is not a valid mapping.
    pub fn from_value(value: JsonValue) -> Result<Self, SqlAdapterError> {
        if !value.is_object() {
            return Err(SqlAdapterError::InvalidArgument(
                "connection parameters must be a mapping".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| {
            SqlAdapterError::InvalidArgument(format!("invalid connection parameters: {e}"))
        })
    }

    #[must_use]
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    #[must_use]
    pub fn with_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = Some(dsn.into());
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    #[must_use]
    pub fn with_unix_socket(mut self, unix_socket: impl Into<String>) -> Self {
        self.unix_socket = Some(unix_socket.into());
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.driver_options.insert(key.into(), value.into());
        self
    }

    /// Backend named explicitly by the `dsn` prefix or the `driver` key.
    ///
    /// The DSN wins when both are present because it is what gets used to connect.
    #[must_use]
    pub fn backend(&self) -> Option<Backend> {
        if let Some(dsn) = &self.dsn
            && let Some((prefix, _)) = dsn.split_once(':')
            && !prefix.trim().is_empty()
        {
            return Some(Backend::from_name(prefix));
        }
        self.driver
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(Backend::from_name)
    }

    /// Check the invariants that must hold before any native call is attempted.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::InvalidConnectionParameters` if both `host` and
    /// `unix_socket` are set.
    pub fn validate(&self) -> Result<(), SqlAdapterError> {
        if self.host.is_some() && self.unix_socket.is_some() {
            return Err(SqlAdapterError::InvalidConnectionParameters(
                "host and unix_socket are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    /// Driver options merged with unrecognized keys; `driver_options` wins on conflict.
    #[must_use]
    pub fn backend_options(&self) -> BTreeMap<String, JsonValue> {
        let mut merged = self.extra.clone();
        merged.extend(
            self.driver_options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        merged
    }

    /// A single backend option rendered as text.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<String> {
        let value = self
            .driver_options
            .get(key)
            .or_else(|| self.extra.get(key))?;
        match value {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        Text(String),
    }

    match Option::<PortValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortValue::Number(port)) => Ok(Some(port)),
        Some(PortValue::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(PortValue::Text(text)) => text
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid port `{text}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aliases_are_normalized() {
        let params = ConnectionParameters::from_value(json!({
            "hostname": "db.local",
            "uid": "app",
            "pwd": "secret",
            "dbname": "orders",
            "port": 3306,
            "pdodriver": "mysql",
            "options": {"timeout": 5}
        }))
        .unwrap();
        assert_eq!(params.host.as_deref(), Some("db.local"));
        assert_eq!(params.username.as_deref(), Some("app"));
        assert_eq!(params.password.as_deref(), Some("secret"));
        assert_eq!(params.database.as_deref(), Some("orders"));
        assert_eq!(params.port, Some(3306));
        assert_eq!(params.backend(), Some(Backend::Mysql));
        assert_eq!(params.option("timeout").as_deref(), Some("5"));
    }

    #[test]
    fn unknown_keys_pass_through_as_options() {
        let params = ConnectionParameters::from_json(
            r#"{"driver": "Pdo_Sqlite", "database": ":memory:", "busy_timeout": 250}"#,
        )
        .unwrap();
        assert_eq!(params.backend(), Some(Backend::Sqlite));
        assert_eq!(
            params.backend_options().get("busy_timeout"),
            Some(&json!(250))
        );
    }

    #[test]
    fn string_ports_are_accepted() {
        let params = ConnectionParameters::from_json(r#"{"port": "5432"}"#).unwrap();
        assert_eq!(params.port, Some(5432));
        let bad = ConnectionParameters::from_json(r#"{"port": "fifty"}"#);
        assert!(matches!(bad, Err(SqlAdapterError::InvalidArgument(_))));
    }

    #[test]
    fn dsn_prefix_beats_driver_key() {
        let params = ConnectionParameters::new()
            .with_driver("mysql")
            .with_dsn("pgsql:dbname=app");
        assert_eq!(params.backend(), Some(Backend::Pgsql));

        let blank_prefix = params.clone().with_dsn(" :dbname=app");
        assert_eq!(blank_prefix.backend(), Some(Backend::Mysql));
        let no_prefix = params.with_dsn("dbname=app");
        assert_eq!(no_prefix.backend(), Some(Backend::Mysql));
    }

    #[test]
    fn host_and_socket_are_exclusive() {
        let params = ConnectionParameters::new()
            .with_host("localhost")
            .with_unix_socket("/tmp/mysql.sock");
        assert!(matches!(
            params.validate(),
            Err(SqlAdapterError::InvalidConnectionParameters(_))
        ));
    }

    #[test]
    fn non_mapping_input_is_rejected() {
        let err = ConnectionParameters::from_value(json!(["host"])).unwrap_err();
        assert!(matches!(err, SqlAdapterError::InvalidArgument(_)));
    }
}
