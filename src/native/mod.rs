//! Seams to the native client libraries.
//!
//! A backend plugs in by implementing [`NativeDriver`] (open a session),
//! [`NativeSession`] (one live connection handle), [`NativeRows`] (a direct
//! result that hands out associative rows) and [`NativeStatement`] (a prepared
//! statement whose output columns are bound to value slots).
//!
//! The scripted in-process backend lives in [`memory`]; the client-library
//! adapters live in the crate's `sqlite`, `postgres` and `mssql` modules.

pub mod memory;

use crate::config::ConnectionParameters;
use crate::dsn::Dsn;
use crate::error::NativeDiagnostic;
use crate::results::{Columns, Row};
use crate::types::RowValues;

/// How a direct query should hand back its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Materialize every row before returning.
    #[default]
    Buffered,
    /// Stream rows as they are fetched, when the backend can.
    Unbuffered,
}

/// Factory for native sessions.
pub trait NativeDriver: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Open a native connection handle.
    ///
    /// # Errors
    /// Returns the native diagnostic when the client refuses the connection.
    fn connect(
        &self,
        dsn: &Dsn,
        params: &ConnectionParameters,
    ) -> Result<Box<dyn NativeSession>, NativeDiagnostic>;
}

/// A live native connection handle. Dropping it releases the handle.
pub trait NativeSession: Send {
    /// Backend identifier reported by the live handle.
    fn backend_name(&self) -> String;

    /// Run one statement directly.
    ///
    /// # Errors
    /// Returns the native diagnostic when the client reports a failure.
    fn query(
        &mut self,
        sql: &str,
        mode: FetchMode,
    ) -> Result<Box<dyn NativeRows>, NativeDiagnostic>;

    /// Prepare a statement for repeated execution.
    ///
    /// # Errors
    /// Returns the native diagnostic when the statement cannot be prepared.
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement>, NativeDiagnostic>;

    /// # Errors
    /// Returns the native diagnostic on failure.
    fn begin_transaction(&mut self) -> Result<(), NativeDiagnostic>;

    /// # Errors
    /// Returns the native diagnostic on failure.
    fn commit(&mut self) -> Result<(), NativeDiagnostic>;

    /// # Errors
    /// Returns the native diagnostic on failure.
    fn rollback(&mut self) -> Result<(), NativeDiagnostic>;

    /// Identity or sequence value produced by the most recent insert.
    ///
    /// # Errors
    /// Returns the native diagnostic when the backend has no such value.
    fn last_insert_id(&mut self, name: Option<&str>) -> Result<Option<RowValues>, NativeDiagnostic>;

    /// Native string escaping primitive, without surrounding quotes.
    fn escape_string(&self, _value: &str) -> Option<String> {
        None
    }

    /// Release server-side resources ahead of drop.
    fn close(&mut self) {}
}

/// Direct result: one associative row per fetch.
pub trait NativeRows: Send {
    fn columns(&self) -> &Columns;

    /// Next row, or `None` at end of data. Fetching advances the native cursor.
    ///
    /// # Errors
    /// Returns the native diagnostic when reading the row fails.
    fn fetch_assoc(&mut self) -> Result<Option<Row>, NativeDiagnostic>;

    /// # Errors
    /// Returns the native diagnostic when the handle cannot seek.
    fn data_seek(&mut self, offset: usize) -> Result<(), NativeDiagnostic>;

    /// Whether every row is already held client side.
    fn is_buffered(&self) -> bool;

    /// Row count, when known.
    fn num_rows(&self) -> Option<usize>;

    fn affected_rows(&self) -> u64;
}

/// Prepared statement handle with explicitly bound output columns.
pub trait NativeStatement: Send {
    /// # Errors
    /// Returns the native diagnostic when execution fails.
    fn execute(&mut self, params: &[RowValues]) -> Result<(), NativeDiagnostic>;

    /// Column names of the current result, in order.
    ///
    /// # Errors
    /// Returns the native diagnostic when metadata is unavailable.
    fn result_metadata(&mut self) -> Result<Vec<String>, NativeDiagnostic>;

    /// Declare how many output slots the caller will pass to [`fetch`](Self::fetch).
    ///
    /// # Errors
    /// Returns the native diagnostic if the slot count does not match the field count.
    fn bind_result(&mut self, slots: usize) -> Result<(), NativeDiagnostic>;

    /// Advance and copy the row into the bound slots. `false` at end of data.
    ///
    /// # Errors
    /// Returns the native diagnostic when reading fails or nothing is bound.
    fn fetch(&mut self, slots: &mut [RowValues]) -> Result<bool, NativeDiagnostic>;

    /// Pull the whole result client side.
    ///
    /// # Errors
    /// Returns the native diagnostic when reading fails.
    fn store_result(&mut self) -> Result<(), NativeDiagnostic>;

    /// # Errors
    /// Returns the native diagnostic when the handle cannot seek.
    fn data_seek(&mut self, offset: usize) -> Result<(), NativeDiagnostic>;

    /// Rows held client side; zero until the result is stored.
    fn num_rows(&self) -> usize;

    fn affected_rows(&self) -> u64;

    fn field_count(&self) -> usize;

    /// Drop the pending result without closing the statement.
    fn free_result(&mut self);
}

/// Rows already pulled client side with a read cursor.
#[derive(Debug, Clone, Default)]
pub struct RowBuffer {
    columns: Columns,
    rows: Vec<Vec<RowValues>>,
    cursor: usize,
}

impl RowBuffer {
    #[must_use]
    pub fn new(columns: Columns, rows: Vec<Vec<RowValues>>) -> Self {
        Self {
            columns,
            rows,
            cursor: 0,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn next_values(&mut self) -> Option<&[RowValues]> {
        let values = self.rows.get(self.cursor)?;
        self.cursor += 1;
        Some(values)
    }

    pub fn next_row(&mut self) -> Option<Row> {
        let columns = self.columns.clone();
        self.next_values()
            .map(|values| Row::new(columns, values.to_vec()))
    }

    /// # Errors
    /// Returns a diagnostic when `offset` is past the end.
    pub fn seek(&mut self, offset: usize) -> Result<(), NativeDiagnostic> {
        if offset > self.rows.len() {
            return Err(NativeDiagnostic::new(format!(
                "offset {offset} is out of range for {} rows",
                self.rows.len()
            )));
        }
        self.cursor = offset;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.cursor = 0;
    }
}

/// Fully materialized direct result shared by the adapters.
#[derive(Debug, Clone, Default)]
pub struct BufferedRows {
    buffer: RowBuffer,
    affected: u64,
}

impl BufferedRows {
    #[must_use]
    pub fn new(columns: Columns, rows: Vec<Vec<RowValues>>, affected: u64) -> Self {
        Self {
            buffer: RowBuffer::new(columns, rows),
            affected,
        }
    }

    /// Result of a statement that returned no rows.
    #[must_use]
    pub fn affected(affected: u64) -> Self {
        Self::new(Columns::default(), Vec::new(), affected)
    }
}

impl NativeRows for BufferedRows {
    fn columns(&self) -> &Columns {
        self.buffer.columns()
    }

    fn fetch_assoc(&mut self) -> Result<Option<Row>, NativeDiagnostic> {
        Ok(self.buffer.next_row())
    }

    fn data_seek(&mut self, offset: usize) -> Result<(), NativeDiagnostic> {
        self.buffer.seek(offset)
    }

    fn is_buffered(&self) -> bool {
        true
    }

    fn num_rows(&self) -> Option<usize> {
        Some(self.buffer.len())
    }

    fn affected_rows(&self) -> u64 {
        self.affected
    }
}

/// Output of running a statement to completion.
#[derive(Debug, Clone, Default)]
pub struct Materialized {
    pub columns: Columns,
    pub rows: Vec<Vec<RowValues>>,
    pub affected: u64,
}

/// Backend half of a statement that pulls its whole result per execution.
pub trait StatementRunner: Send {
    /// Column names known from preparation.
    fn columns(&self) -> Vec<String>;

    /// # Errors
    /// Returns the native diagnostic when execution fails.
    fn run(&mut self, params: &[RowValues]) -> Result<Materialized, NativeDiagnostic>;
}

/// [`NativeStatement`] over a [`StatementRunner`].
///
/// With `store_on_execute` the rows count as stored as soon as the statement
/// runs; otherwise `num_rows` stays zero until `store_result`.
pub struct MaterializedStatement<R> {
    runner: R,
    buffer: RowBuffer,
    affected: u64,
    bound: Option<usize>,
    stored: bool,
    store_on_execute: bool,
}

impl<R: StatementRunner> MaterializedStatement<R> {
    pub fn new(runner: R, store_on_execute: bool) -> Self {
        Self {
            runner,
            buffer: RowBuffer::default(),
            affected: 0,
            bound: None,
            stored: false,
            store_on_execute,
        }
    }
}

impl<R: StatementRunner> NativeStatement for MaterializedStatement<R> {
    fn execute(&mut self, params: &[RowValues]) -> Result<(), NativeDiagnostic> {
        let Materialized {
            columns,
            rows,
            affected,
        } = self.runner.run(params)?;
        self.buffer = RowBuffer::new(columns, rows);
        self.affected = affected;
        self.stored = self.store_on_execute;
        Ok(())
    }

    fn result_metadata(&mut self) -> Result<Vec<String>, NativeDiagnostic> {
        if self.buffer.columns().is_empty() {
            Ok(self.runner.columns())
        } else {
            Ok(self.buffer.columns().names().to_vec())
        }
    }

    fn bind_result(&mut self, slots: usize) -> Result<(), NativeDiagnostic> {
        let fields = self.field_count();
        if slots != fields {
            return Err(NativeDiagnostic::new(format!(
                "number of bind variables ({slots}) doesn't match number of fields ({fields})"
            )));
        }
        self.bound = Some(slots);
        Ok(())
    }

    fn fetch(&mut self, slots: &mut [RowValues]) -> Result<bool, NativeDiagnostic> {
        if self.bound.is_none() {
            return Err(NativeDiagnostic::new("no output slots are bound"));
        }
        match self.buffer.next_values() {
            Some(values) => {
                for (slot, value) in slots.iter_mut().zip(values.iter()) {
                    slot.clone_from(value);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn store_result(&mut self) -> Result<(), NativeDiagnostic> {
        self.stored = true;
        Ok(())
    }

    fn data_seek(&mut self, offset: usize) -> Result<(), NativeDiagnostic> {
        self.buffer.seek(offset)
    }

    fn num_rows(&self) -> usize {
        if self.stored { self.buffer.len() } else { 0 }
    }

    fn affected_rows(&self) -> u64 {
        self.affected
    }

    fn field_count(&self) -> usize {
        if self.buffer.columns().is_empty() {
            self.runner.columns().len()
        } else {
            self.buffer.columns().len()
        }
    }

    fn free_result(&mut self) {
        self.buffer.clear();
        self.stored = false;
    }
}
