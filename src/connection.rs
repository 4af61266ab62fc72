use std::fmt;

use crate::config::ConnectionParameters;
use crate::dsn::Dsn;
use crate::error::{NativeDiagnostic, SqlAdapterError};
use crate::native::{FetchMode, NativeDriver, NativeSession};
use crate::profiler::Profiler;
use crate::results::ResultSet;
use crate::statement::Statement;
use crate::types::{Backend, RowValues};

/// Native driver compiled in for a backend.
///
/// # Errors
/// Returns `SqlAdapterError::Unimplemented` if the backend's feature is disabled
/// or no client library is wrapped for it.
pub fn native_driver_for(backend: &Backend) -> Result<Box<dyn NativeDriver>, SqlAdapterError> {
    match backend {
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => Ok(Box::new(crate::sqlite::SqliteDriver)),
        #[cfg(feature = "postgres")]
        Backend::Pgsql => Ok(Box::new(crate::postgres::PostgresDriver)),
        #[cfg(feature = "mssql")]
        Backend::Sqlsrv | Backend::Dblib => Ok(Box::new(crate::mssql::MssqlDriver)),
        other => Err(SqlAdapterError::Unimplemented(format!(
            "no native driver is compiled in for `{other}`"
        ))),
    }
}

/// One exclusively owned native connection.
///
/// Created unconnected; every operation that needs the server connects on
/// demand. Nested [`begin_transaction`](Self::begin_transaction) calls are
/// flattened into a single native transaction.
///
/// ```rust
/// use sql_adapter::native::memory::MemoryDriver;
/// use sql_adapter::prelude::*;
///
/// let driver = MemoryDriver::new("sqlite");
/// let probe = driver.probe();
/// let params = ConnectionParameters::new().with_driver("sqlite").with_database("app.db");
/// let mut conn = Connection::with_native(params, Box::new(driver));
///
/// conn.begin_transaction()?;
/// conn.begin_transaction()?;
/// conn.commit()?;
/// conn.commit()?;
/// assert_eq!((probe.begins(), probe.commits()), (1, 1));
/// assert_eq!(conn.dsn().map(ToString::to_string).as_deref(), Some("sqlite:app.db"));
/// # Ok::<(), SqlAdapterError>(())
/// ```
pub struct Connection {
    parameters: ConnectionParameters,
    native: Option<Box<dyn NativeDriver>>,
    session: Option<Box<dyn NativeSession>>,
    backend: Option<Backend>,
    in_transaction: bool,
    nested_transactions: usize,
    dsn: Option<Dsn>,
    profiler: Option<Box<dyn Profiler>>,
    fetch_mode: FetchMode,
}

impl Connection {
    /// The native driver is picked from the backend when connecting.
    #[must_use]
    pub fn new(parameters: ConnectionParameters) -> Self {
        Self {
            backend: parameters.backend(),
            parameters,
            native: None,
            session: None,
            in_transaction: false,
            nested_transactions: 0,
            dsn: None,
            profiler: None,
            fetch_mode: FetchMode::Buffered,
        }
    }

    /// Use a caller-supplied native driver instead of the compiled-in one.
    #[must_use]
    pub fn with_native(parameters: ConnectionParameters, native: Box<dyn NativeDriver>) -> Self {
        let mut connection = Self::new(parameters);
        connection.native = Some(native);
        connection
    }

    /// Replace the parameters. Takes effect on the next connect.
    pub fn set_connection_parameters(&mut self, parameters: ConnectionParameters) {
        self.backend = parameters.backend();
        self.parameters = parameters;
    }

    #[must_use]
    pub fn parameters(&self) -> &ConnectionParameters {
        &self.parameters
    }

    pub fn set_profiler(&mut self, profiler: impl Profiler + 'static) {
        self.profiler = Some(Box::new(profiler));
    }

    #[must_use]
    pub fn profiler(&self) -> Option<&dyn Profiler> {
        self.profiler.as_deref()
    }

    /// How direct queries ask the native client for rows.
    pub fn set_fetch_mode(&mut self, mode: FetchMode) {
        self.fetch_mode = mode;
    }

    #[must_use]
    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    /// Open the native session. Does nothing when already connected.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::InvalidConnectionParameters` for unusable
    /// parameters, `SqlAdapterError::Unimplemented` when no native driver is
    /// available, or `SqlAdapterError::ConnectionError` when the native client
    /// refuses the connection.
    pub fn connect(&mut self) -> Result<(), SqlAdapterError> {
        if self.session.is_some() {
            return Ok(());
        }

        let dsn = Dsn::from_parameters(&self.parameters)?;
        if self.native.is_none() {
            self.native = Some(native_driver_for(dsn.backend())?);
        }
        let Some(native) = self.native.as_ref() else {
            return Err(SqlAdapterError::Unimplemented(format!(
                "no native driver for `{}`",
                dsn.backend()
            )));
        };

        let session = native
            .connect(&dsn, &self.parameters)
            .map_err(|diagnostic| SqlAdapterError::ConnectionError {
                message: format!("{} could not connect to {}", native.name(), dsn.backend()),
                diagnostic,
            })?;

        tracing::debug!(dsn = %dsn, driver = native.name(), "connected");
        self.backend = Some(Backend::from_name(&session.backend_name()));
        self.session = Some(session);
        self.dsn = Some(dsn);
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Release the native session and forget any open transaction.
    pub fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            tracing::debug!(backend = ?self.backend, "disconnected");
        }
        self.in_transaction = false;
        self.nested_transactions = 0;
    }

    /// # Errors
    /// Returns connect errors, or `SqlAdapterError::Native` if the native BEGIN fails.
    pub fn begin_transaction(&mut self) -> Result<(), SqlAdapterError> {
        self.connect()?;
        if self.nested_transactions == 0 {
            self.session_mut()?.begin_transaction()?;
            self.in_transaction = true;
            tracing::trace!("transaction started");
        }
        self.nested_transactions += 1;
        Ok(())
    }

    /// Close one nesting level; the native COMMIT runs once the outermost level closes.
    ///
    /// # Errors
    /// Returns connect errors, or `SqlAdapterError::Native` if the native COMMIT fails.
    pub fn commit(&mut self) -> Result<(), SqlAdapterError> {
        self.connect()?;
        if self.in_transaction {
            self.nested_transactions = self.nested_transactions.saturating_sub(1);
        }
        if self.nested_transactions == 0 {
            // runs even without a tracked transaction so an out-of-band BEGIN still ends
            self.session_mut()?.commit()?;
            self.in_transaction = false;
            tracing::trace!("transaction committed");
        }
        Ok(())
    }

    /// Roll back the whole transaction regardless of nesting depth.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::TransactionState` when not connected or not in
    /// a transaction, or `SqlAdapterError::Native` if the native ROLLBACK fails.
    pub fn rollback(&mut self) -> Result<(), SqlAdapterError> {
        if !self.is_connected() {
            return Err(SqlAdapterError::TransactionState(
                "must be connected before you can rollback".to_string(),
            ));
        }
        if !self.in_transaction {
            return Err(SqlAdapterError::TransactionState(
                "must call begin_transaction() before you can rollback".to_string(),
            ));
        }
        let outcome = self.session_mut()?.rollback();
        self.in_transaction = false;
        self.nested_transactions = 0;
        tracing::trace!("transaction rolled back");
        outcome.map_err(SqlAdapterError::from)
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    #[must_use]
    pub fn transaction_depth(&self) -> usize {
        self.nested_transactions
    }

    /// Run one statement directly.
    ///
    /// # Errors
    /// Returns connect errors, or `SqlAdapterError::QueryExecution` carrying the
    /// SQL and the native diagnostic. Informational diagnostics do not fail the
    /// call; they come back as an empty result with [`ResultSet::warnings`].
    pub fn execute(&mut self, sql: &str) -> Result<ResultSet<'static>, SqlAdapterError> {
        self.connect()?;
        let mode = self.fetch_mode;

        self.profile_start(sql);
        let outcome = self.session_mut()?.query(sql, mode);
        self.profile_finish(sql);
        tracing::trace!(sql, ok = outcome.is_ok(), "statement executed");

        match outcome {
            Ok(rows) => {
                let generated = self.last_generated_value(None);
                Ok(ResultSet::from_rows(rows, generated))
            }
            Err(diagnostic) => self.warning_result(sql, diagnostic),
        }
    }

    /// Prepare a statement on the native session.
    ///
    /// # Errors
    /// Returns connect errors, or `SqlAdapterError::QueryExecution` if the
    /// native client rejects the SQL.
    pub fn prepare(&mut self, sql: &str) -> Result<Statement, SqlAdapterError> {
        self.connect()?;
        let handle = self
            .session_mut()?
            .prepare(sql)
            .map_err(|diagnostic| SqlAdapterError::query(sql, diagnostic))?;
        Ok(Statement::new(sql, handle))
    }

    /// Run a prepared statement with positional parameters.
    ///
    /// # Errors
    /// Returns connect errors, or `SqlAdapterError::QueryExecution` carrying the
    /// SQL and the native diagnostic.
    pub fn execute_prepared<'s>(
        &mut self,
        statement: &'s mut Statement,
        params: &[RowValues],
    ) -> Result<ResultSet<'s>, SqlAdapterError> {
        self.connect()?;
        let (sql, handle, buffer_results) = statement.parts_mut();

        self.profile_start(sql);
        let outcome = handle.execute(params);
        self.profile_finish(sql);
        tracing::trace!(
            sql,
            params = params.len(),
            ok = outcome.is_ok(),
            "statement executed"
        );

        if let Err(diagnostic) = outcome {
            return self.warning_result(sql, diagnostic);
        }
        if buffer_results == Some(true) {
            handle.store_result()?;
        }
        let generated = self.last_generated_value(None);
        Ok(ResultSet::from_statement(handle, buffer_results, generated))
    }

    /// Identity or sequence value produced by the most recent insert.
    ///
    /// Sequence-only backends need `name`. Native failures are logged and read as `None`.
    pub fn last_generated_value(&mut self, name: Option<&str>) -> Option<RowValues> {
        if name.is_none()
            && self
                .backend
                .as_ref()
                .is_some_and(Backend::requires_sequence_name)
        {
            return None;
        }
        let session = self.session.as_mut()?;
        match session.last_insert_id(name) {
            Ok(value) => value,
            Err(diagnostic) => {
                tracing::debug!(%diagnostic, sequence = ?name, "generated value lookup failed");
                None
            }
        }
    }

    /// The native escaping primitive, without quotes, when connected and offered.
    #[must_use]
    pub fn escape_string(&self, value: &str) -> Option<String> {
        self.session.as_ref()?.escape_string(value)
    }

    /// Connection string of the last successful connect.
    #[must_use]
    pub fn dsn(&self) -> Option<&Dsn> {
        self.dsn.as_ref()
    }

    /// Backend reported by the live session, or named by the parameters before connecting.
    #[must_use]
    pub fn backend(&self) -> Option<&Backend> {
        self.backend.as_ref()
    }

    fn session_mut(&mut self) -> Result<&mut Box<dyn NativeSession>, SqlAdapterError> {
        self.session
            .as_mut()
            .ok_or_else(|| SqlAdapterError::ConnectionError {
                message: "no native session".to_string(),
                diagnostic: NativeDiagnostic::new("not connected"),
            })
    }

    fn warning_result<'s>(
        &self,
        sql: &str,
        diagnostic: NativeDiagnostic,
    ) -> Result<ResultSet<'s>, SqlAdapterError> {
        if diagnostic.is_benign_warning() {
            tracing::debug!(sql, %diagnostic, "native warning suppressed");
            return Ok(ResultSet::from_warning(diagnostic));
        }
        Err(SqlAdapterError::query(sql, diagnostic))
    }

    fn profile_start(&self, sql: &str) {
        if let Some(profiler) = &self.profiler {
            profiler.profiler_start(sql);
        }
    }

    fn profile_finish(&self, sql: &str) {
        if let Some(profiler) = &self.profiler {
            profiler.profiler_finish(sql);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.backend)
            .field("dsn", &self.dsn)
            .field("connected", &self.is_connected())
            .field("in_transaction", &self.in_transaction)
            .field("nested_transactions", &self.nested_transactions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::memory::{MemoryDriver, MemoryEvent, MemoryResponse};

    fn connection(driver: MemoryDriver) -> Connection {
        let params = ConnectionParameters::new()
            .with_driver("sqlite")
            .with_database(":memory:");
        Connection::with_native(params, Box::new(driver))
    }

    #[test]
    fn connect_is_idempotent_and_caches_the_dsn() {
        let driver = MemoryDriver::new("sqlite");
        let probe = driver.probe();
        let mut conn = connection(driver);
        assert!(!conn.is_connected());
        conn.connect().unwrap();
        conn.connect().unwrap();
        assert_eq!(probe.connects(), vec!["sqlite::memory:".to_string()]);
        assert_eq!(conn.dsn().unwrap().to_string(), "sqlite::memory:");
    }

    #[test]
    fn backend_follows_the_live_session() {
        let mut conn = connection(MemoryDriver::new("Pdo_Pgsql"));
        assert_eq!(conn.backend(), Some(&Backend::Sqlite));
        conn.connect().unwrap();
        assert_eq!(conn.backend(), Some(&Backend::Pgsql));
    }

    #[test]
    fn invalid_parameters_fail_before_the_native_call() {
        let driver = MemoryDriver::new("mysql");
        let probe = driver.probe();
        let params = ConnectionParameters::new()
            .with_driver("mysql")
            .with_host("db")
            .with_unix_socket("/tmp/mysql.sock");
        let mut conn = Connection::with_native(params, Box::new(driver));
        assert!(matches!(
            conn.execute("SELECT 1"),
            Err(SqlAdapterError::InvalidConnectionParameters(_))
        ));
        assert!(probe.events().is_empty());
    }

    #[test]
    fn nested_begin_commit_issues_one_pair() {
        let driver = MemoryDriver::new("sqlite");
        let probe = driver.probe();
        let mut conn = connection(driver);
        for _ in 0..3 {
            conn.begin_transaction().unwrap();
        }
        assert_eq!(conn.transaction_depth(), 3);
        for _ in 0..2 {
            conn.commit().unwrap();
            assert!(conn.in_transaction());
        }
        conn.commit().unwrap();
        assert!(!conn.in_transaction());
        assert_eq!((probe.begins(), probe.commits()), (1, 1));
    }

    #[test]
    fn rollback_requires_a_transaction() {
        let mut conn = connection(MemoryDriver::new("sqlite"));
        assert!(
            matches!(conn.rollback(), Err(SqlAdapterError::TransactionState(_)))
        );
        conn.connect().unwrap();
        assert!(
            matches!(conn.rollback(), Err(SqlAdapterError::TransactionState(_)))
        );
    }

    #[test]
    fn generated_value_is_captured_per_statement() {
        let driver = MemoryDriver::new("sqlite")
            .respond("INSERT INTO t VALUES (1)", MemoryResponse::affected(1))
            .with_last_insert_id(42);
        let mut conn = connection(driver);
        let result = conn.execute("INSERT INTO t VALUES (1)").unwrap();
        assert_eq!(result.generated_value(), Some(&RowValues::Int(42)));
        assert_eq!(result.affected_rows(), 1);
    }

    #[test]
    fn sequence_backends_need_a_name() {
        let driver = MemoryDriver::new("pgsql")
            .with_last_insert_id(1)
            .with_sequence("t_id_seq", 5);
        let probe = driver.probe();
        let mut conn = connection(driver);
        conn.connect().unwrap();
        assert_eq!(conn.last_generated_value(None), None);
        assert_eq!(
            conn.last_generated_value(Some("t_id_seq")),
            Some(RowValues::Int(5))
        );
        assert!(!probe.events().contains(&MemoryEvent::LastInsertId(None)));
    }

    #[test]
    fn drop_disconnects() {
        let driver = MemoryDriver::new("sqlite");
        let probe = driver.probe();
        {
            let mut conn = connection(driver);
            conn.connect().unwrap();
        }
        assert_eq!(probe.disconnects(), 1);
    }
}
