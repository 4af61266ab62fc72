//! Scripted in-process backend.
//!
//! Responses are keyed by exact SQL text and can be replayed any number of
//! times. Every native call is recorded so tests can assert on what the
//! connection layer actually sent.
//!
//! ```rust
//! use sql_adapter::native::memory::{MemoryDriver, MemoryResponse};
//! use sql_adapter::prelude::*;
//!
//! let driver = MemoryDriver::new("sqlite")
//!     .respond("SELECT 1 AS one", MemoryResponse::rows(&["one"], vec![vec![RowValues::Int(1)]]));
//! let probe = driver.probe();
//!
//! let params = ConnectionParameters::new().with_driver("sqlite").with_database(":memory:");
//! let mut conn = Connection::with_native(params, Box::new(driver));
//! let mut result = conn.execute("SELECT 1 AS one")?;
//! assert_eq!(result.count()?, 1);
//! assert_eq!(probe.queries(), vec!["SELECT 1 AS one".to_string()]);
//! # Ok::<(), SqlAdapterError>(())
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::ConnectionParameters;
use crate::dsn::Dsn;
use crate::error::NativeDiagnostic;
use crate::native::{
    BufferedRows, FetchMode, Materialized, MaterializedStatement, NativeDriver, NativeRows,
    NativeSession, NativeStatement, RowBuffer, StatementRunner,
};
use crate::results::{Columns, Row};
use crate::types::RowValues;

/// Native call recorded by the memory backend.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryEvent {
    Connect(String),
    Disconnect,
    Begin,
    Commit,
    Rollback,
    Query(String),
    Prepare(String),
    Execute(String, Vec<RowValues>),
    LastInsertId(Option<String>),
}

/// Scripted reply for one SQL text.
#[derive(Debug, Clone)]
pub struct MemoryResponse {
    outcome: Result<Materialized, NativeDiagnostic>,
    streamed: bool,
}

impl MemoryResponse {
    /// A row-returning reply.
    #[must_use]
    pub fn rows(columns: &[&str], rows: Vec<Vec<RowValues>>) -> Self {
        let columns = Columns::new(columns.iter().map(|c| (*c).to_string()).collect());
        Self {
            outcome: Ok(Materialized {
                columns,
                rows,
                affected: 0,
            }),
            streamed: false,
        }
    }

    /// A write reply with no result columns.
    #[must_use]
    pub fn affected(affected: u64) -> Self {
        Self {
            outcome: Ok(Materialized {
                affected,
                ..Materialized::default()
            }),
            streamed: false,
        }
    }

    /// The native client reports this diagnostic instead of a result.
    #[must_use]
    pub fn failure(diagnostic: NativeDiagnostic) -> Self {
        Self {
            outcome: Err(diagnostic),
            streamed: false,
        }
    }

    /// Always hand the rows back as a forward-only stream.
    #[must_use]
    pub fn unbuffered(mut self) -> Self {
        self.streamed = true;
        self
    }
}

#[derive(Debug)]
struct MemoryState {
    backend: String,
    responses: HashMap<String, MemoryResponse>,
    connect_error: Option<NativeDiagnostic>,
    last_insert_id: Result<Option<RowValues>, NativeDiagnostic>,
    sequences: HashMap<String, RowValues>,
    native_escaping: bool,
    events: Vec<MemoryEvent>,
}

type SharedState = Arc<Mutex<MemoryState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Driver whose sessions replay scripted responses.
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    state: SharedState,
}

impl MemoryDriver {
    /// `backend` is the name the live session reports, e.g. `sqlite` or `pgsql`.
    #[must_use]
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                backend: backend.into(),
                responses: HashMap::new(),
                connect_error: None,
                last_insert_id: Ok(None),
                sequences: HashMap::new(),
                native_escaping: false,
                events: Vec::new(),
            })),
        }
    }

    #[must_use]
    pub fn respond(self, sql: impl Into<String>, response: MemoryResponse) -> Self {
        lock(&self.state).responses.insert(sql.into(), response);
        self
    }

    #[must_use]
    pub fn fail_connect(self, diagnostic: NativeDiagnostic) -> Self {
        lock(&self.state).connect_error = Some(diagnostic);
        self
    }

    /// Value reported for un-named generated-value lookups.
    #[must_use]
    pub fn with_last_insert_id(self, value: impl Into<RowValues>) -> Self {
        lock(&self.state).last_insert_id = Ok(Some(value.into()));
        self
    }

    /// Current value of a named sequence.
    #[must_use]
    pub fn with_sequence(self, name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        lock(&self.state)
            .sequences
            .insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn fail_last_insert_id(self, diagnostic: NativeDiagnostic) -> Self {
        lock(&self.state).last_insert_id = Err(diagnostic);
        self
    }

    /// Offer a native escaping primitive that doubles single quotes.
    #[must_use]
    pub fn with_native_escaping(self) -> Self {
        lock(&self.state).native_escaping = true;
        self
    }

    /// Handle for inspecting recorded calls after the driver has been moved away.
    #[must_use]
    pub fn probe(&self) -> MemoryProbe {
        MemoryProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl NativeDriver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn connect(
        &self,
        dsn: &Dsn,
        _params: &ConnectionParameters,
    ) -> Result<Box<dyn NativeSession>, NativeDiagnostic> {
        let mut state = lock(&self.state);
        if let Some(diagnostic) = &state.connect_error {
            return Err(diagnostic.clone());
        }
        state.events.push(MemoryEvent::Connect(dsn.to_string()));
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

/// Read-only view over what a [`MemoryDriver`] recorded.
#[derive(Debug, Clone)]
pub struct MemoryProbe {
    state: SharedState,
}

impl MemoryProbe {
    #[must_use]
    pub fn events(&self) -> Vec<MemoryEvent> {
        lock(&self.state).events.clone()
    }

    fn count(&self, wanted: &MemoryEvent) -> usize {
        lock(&self.state)
            .events
            .iter()
            .filter(|event| *event == wanted)
            .count()
    }

    #[must_use]
    pub fn begins(&self) -> usize {
        self.count(&MemoryEvent::Begin)
    }

    #[must_use]
    pub fn commits(&self) -> usize {
        self.count(&MemoryEvent::Commit)
    }

    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.count(&MemoryEvent::Rollback)
    }

    #[must_use]
    pub fn disconnects(&self) -> usize {
        self.count(&MemoryEvent::Disconnect)
    }

    /// Connection strings passed to `connect`, in order.
    #[must_use]
    pub fn connects(&self) -> Vec<String> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|event| match event {
                MemoryEvent::Connect(dsn) => Some(dsn.clone()),
                _ => None,
            })
            .collect()
    }

    /// SQL sent through direct queries, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|event| match event {
                MemoryEvent::Query(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Parameter lists of every prepared execution, in order.
    #[must_use]
    pub fn executions(&self) -> Vec<(String, Vec<RowValues>)> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|event| match event {
                MemoryEvent::Execute(sql, params) => Some((sql.clone(), params.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.state).events.clear();
    }
}

struct MemorySession {
    state: SharedState,
    open: bool,
}

impl MemorySession {
    fn record(&self, event: MemoryEvent) {
        lock(&self.state).events.push(event);
    }

    fn response_for(&self, sql: &str) -> MemoryResponse {
        lock(&self.state)
            .responses
            .get(sql)
            .cloned()
            .unwrap_or_else(|| MemoryResponse::affected(0))
    }
}

impl NativeSession for MemorySession {
    fn backend_name(&self) -> String {
        lock(&self.state).backend.clone()
    }

    fn query(
        &mut self,
        sql: &str,
        mode: FetchMode,
    ) -> Result<Box<dyn NativeRows>, NativeDiagnostic> {
        self.record(MemoryEvent::Query(sql.to_string()));
        let response = self.response_for(sql);
        let Materialized {
            columns,
            rows,
            affected,
        } = response.outcome?;

        if response.streamed || mode == FetchMode::Unbuffered {
            Ok(Box::new(StreamedRows {
                buffer: RowBuffer::new(columns, rows),
                affected,
            }))
        } else {
            Ok(Box::new(BufferedRows::new(columns, rows, affected)))
        }
    }

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement>, NativeDiagnostic> {
        self.record(MemoryEvent::Prepare(sql.to_string()));
        let response = self.response_for(sql);
        // a scripted failure surfaces when the statement runs, not when it is prepared
        let columns = match &response.outcome {
            Ok(materialized) => materialized.columns.names().to_vec(),
            Err(_) => Vec::new(),
        };
        let runner = MemoryRunner {
            state: Arc::clone(&self.state),
            sql: sql.to_string(),
            columns,
            response,
        };
        Ok(Box::new(MaterializedStatement::new(runner, false)))
    }

    fn begin_transaction(&mut self) -> Result<(), NativeDiagnostic> {
        self.record(MemoryEvent::Begin);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), NativeDiagnostic> {
        self.record(MemoryEvent::Commit);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), NativeDiagnostic> {
        self.record(MemoryEvent::Rollback);
        Ok(())
    }

    fn last_insert_id(
        &mut self,
        name: Option<&str>,
    ) -> Result<Option<RowValues>, NativeDiagnostic> {
        let mut state = lock(&self.state);
        state
            .events
            .push(MemoryEvent::LastInsertId(name.map(str::to_string)));
        match name {
            Some(sequence) => Ok(state.sequences.get(sequence).cloned()),
            None => state.last_insert_id.clone(),
        }
    }

    fn escape_string(&self, value: &str) -> Option<String> {
        lock(&self.state)
            .native_escaping
            .then(|| value.replace('\'', "''"))
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.record(MemoryEvent::Disconnect);
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Forward-only rows: once a row has been handed out it cannot be revisited.
struct StreamedRows {
    buffer: RowBuffer,
    affected: u64,
}

impl NativeRows for StreamedRows {
    fn columns(&self) -> &Columns {
        self.buffer.columns()
    }

    fn fetch_assoc(&mut self) -> Result<Option<Row>, NativeDiagnostic> {
        Ok(self.buffer.next_row())
    }

    fn data_seek(&mut self, offset: usize) -> Result<(), NativeDiagnostic> {
        if offset == self.buffer.cursor() {
            return Ok(());
        }
        Err(NativeDiagnostic::new("cannot seek in a streamed result"))
    }

    fn is_buffered(&self) -> bool {
        false
    }

    fn num_rows(&self) -> Option<usize> {
        None
    }

    fn affected_rows(&self) -> u64 {
        self.affected
    }
}

struct MemoryRunner {
    state: SharedState,
    sql: String,
    columns: Vec<String>,
    response: MemoryResponse,
}

impl StatementRunner for MemoryRunner {
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn run(&mut self, params: &[RowValues]) -> Result<Materialized, NativeDiagnostic> {
        lock(&self.state)
            .events
            .push(MemoryEvent::Execute(self.sql.clone(), params.to_vec()));
        self.response.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dsn() -> Dsn {
        Dsn::parse("sqlite::memory:").unwrap()
    }

    #[test]
    fn unscripted_sql_affects_nothing() {
        let driver = MemoryDriver::new("sqlite");
        let mut session = driver
            .connect(&dsn(), &ConnectionParameters::new())
            .unwrap();
        let rows = session.query("DELETE FROM t", FetchMode::Buffered).unwrap();
        assert_eq!(rows.affected_rows(), 0);
        assert!(rows.columns().is_empty());
    }

    #[test]
    fn streamed_rows_refuse_to_seek_back() {
        let driver = MemoryDriver::new("pgsql").respond(
            "SELECT n",
            MemoryResponse::rows(&["n"], vec![vec![RowValues::Int(1)]]).unbuffered(),
        );
        let mut session = driver
            .connect(&dsn(), &ConnectionParameters::new())
            .unwrap();
        let mut rows = session.query("SELECT n", FetchMode::Buffered).unwrap();
        assert!(!rows.is_buffered());
        assert_eq!(rows.num_rows(), None);
        assert!(rows.fetch_assoc().unwrap().is_some());
        assert!(rows.data_seek(0).is_err());
    }

    #[test]
    fn probe_sees_calls_and_disconnect_on_drop() {
        let driver = MemoryDriver::new("sqlite").with_last_insert_id(9);
        let probe = driver.probe();
        {
            let mut session = driver
                .connect(&dsn(), &ConnectionParameters::new())
                .unwrap();
            session.begin_transaction().unwrap();
            session.commit().unwrap();
            assert_eq!(
                session.last_insert_id(None).unwrap(),
                Some(RowValues::Int(9))
            );
        }
        assert_eq!(probe.begins(), 1);
        assert_eq!(probe.commits(), 1);
        assert_eq!(probe.disconnects(), 1);
        assert_eq!(probe.connects(), vec!["sqlite::memory:".to_string()]);
    }

    #[test]
    fn connect_failure_is_reported() {
        let refused = NativeDiagnostic::new("refused").with_code(2002);
        let driver = MemoryDriver::new("sqlite").fail_connect(refused);
        let err = driver
            .connect(&dsn(), &ConnectionParameters::new())
            .err()
            .unwrap();
        assert_eq!(err.code, Some(2002));
    }
}
