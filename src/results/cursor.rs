use std::fmt;

use crate::error::{NativeDiagnostic, SqlAdapterError};
use crate::native::{BufferedRows, NativeRows, NativeStatement};
use crate::results::{Columns, Row};
use crate::types::RowValues;

/// Output columns bound to a statement handle: names plus the value slots the
/// native fetch writes into. Each fetched row is a copy of the slots.
#[derive(Debug, Clone)]
pub struct OutputBinding {
    columns: Columns,
    slots: Vec<RowValues>,
}

impl OutputBinding {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        let slots = vec![RowValues::Null; names.len()];
        Self {
            columns: Columns::new(names),
            slots,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    fn snapshot(&self) -> Row {
        Row::new(self.columns.clone(), self.slots.clone())
    }
}

/// Where a [`ResultSet`] pulls its rows from.
enum RowSource<'s> {
    /// Direct result handing out one associative row per fetch.
    Direct(Box<dyn NativeRows>),
    /// Prepared statement with explicitly bound output columns.
    Statement {
        handle: &'s mut Box<dyn NativeStatement>,
        binding: Option<OutputBinding>,
        freed: bool,
    },
}

/// Cursor over the result of exactly one executed statement.
///
/// Buffered results support [`rewind`](Self::rewind) and [`count`](Self::count);
/// unbuffered ones are forward-only and single-pass. A result produced by a
/// prepared statement borrows it and cannot outlive it.
///
/// ```rust
/// use sql_adapter::native::memory::{MemoryDriver, MemoryResponse};
/// use sql_adapter::prelude::*;
///
/// let driver = MemoryDriver::new("sqlite").respond(
///     "SELECT id FROM t",
///     MemoryResponse::rows(&["id"], vec![vec![RowValues::Int(1)], vec![RowValues::Int(2)]]),
/// );
/// let params = ConnectionParameters::new().with_driver("sqlite");
/// let mut conn = Connection::with_native(params, Box::new(driver));
/// let mut result = conn.execute("SELECT id FROM t")?;
///
/// let mut ids = Vec::new();
/// while result.valid()? {
///     ids.push(result.current()?.and_then(|row| row.get("id").cloned()));
///     result.next()?;
/// }
/// assert_eq!(ids, vec![Some(RowValues::Int(1)), Some(RowValues::Int(2))]);
/// assert_eq!(result.count()?, 2);
/// # Ok::<(), SqlAdapterError>(())
/// ```
pub struct ResultSet<'s> {
    source: RowSource<'s>,
    buffered: Option<bool>,
    position: usize,
    current: Option<Row>,
    current_complete: bool,
    next_complete: bool,
    generated_value: Option<RowValues>,
    warnings: Vec<NativeDiagnostic>,
}

impl ResultSet<'static> {
    /// Wrap a direct native result. Its buffering is known up front.
    #[must_use]
    pub fn from_rows(rows: Box<dyn NativeRows>, generated_value: Option<RowValues>) -> Self {
        let buffered = Some(rows.is_buffered());
        Self::with_source(RowSource::Direct(rows), buffered, generated_value)
    }

    /// Empty buffered result standing in for a statement that only produced a warning.
    #[must_use]
    pub fn from_warning(warning: NativeDiagnostic) -> Self {
        let mut result = Self::from_rows(Box::new(BufferedRows::affected(0)), None);
        result.warnings.push(warning);
        result
    }
}

impl<'s> ResultSet<'s> {
    /// Wrap an executed statement handle.
    ///
    /// Without an explicit `buffered` the result counts as buffered only when the
    /// handle already holds rows client side; otherwise buffering stays unknown
    /// until [`buffer`](Self::buffer) or [`set_buffered`](Self::set_buffered).
    #[must_use]
    pub fn from_statement(
        handle: &'s mut Box<dyn NativeStatement>,
        buffered: Option<bool>,
        generated_value: Option<RowValues>,
    ) -> Self {
        let buffered = buffered.or_else(|| (handle.num_rows() > 0).then_some(true));
        Self::with_source(
            RowSource::Statement {
                handle,
                binding: None,
                freed: false,
            },
            buffered,
            generated_value,
        )
    }

    fn with_source(
        source: RowSource<'s>,
        buffered: Option<bool>,
        generated_value: Option<RowValues>,
    ) -> Self {
        Self {
            source,
            buffered,
            position: 0,
            current: None,
            current_complete: false,
            next_complete: false,
            generated_value,
            warnings: Vec::new(),
        }
    }

    /// Row under the cursor, fetched on first access. `None` past the end.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::Native` if the native fetch fails.
    pub fn current(&mut self) -> Result<Option<&Row>, SqlAdapterError> {
        if !self.current_complete {
            self.load()?;
        }
        Ok(self.current.as_ref())
    }

    /// Move past the current row. When the row was never fetched it is read
    /// and discarded so the native cursor stays in step.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::Native` if skipping the row fails.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<(), SqlAdapterError> {
        self.current_complete = false;
        if !self.next_complete && self.fetch_native()?.is_some() {
            self.position += 1;
        }
        self.next_complete = false;
        Ok(())
    }

    /// Zero-based index of the row under the cursor.
    #[must_use]
    pub fn key(&self) -> usize {
        if self.current_complete {
            self.position.saturating_sub(1)
        } else {
            self.position
        }
    }

    /// Seek back to the first row.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::NonRewindable` if the result is unbuffered and
    /// has advanced, or `SqlAdapterError::Native` if the native seek fails.
    pub fn rewind(&mut self) -> Result<(), SqlAdapterError> {
        if self.position == 0 {
            return Ok(());
        }
        if self.buffered == Some(false) {
            return Err(SqlAdapterError::NonRewindable);
        }
        match &mut self.source {
            RowSource::Direct(rows) => rows.data_seek(0)?,
            RowSource::Statement { handle, .. } => handle.data_seek(0)?,
        }
        self.position = 0;
        self.current = None;
        self.current_complete = false;
        self.next_complete = false;
        Ok(())
    }

    /// Whether a row is available at the cursor. This is the end-of-data check.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::Native` if the native fetch fails.
    pub fn valid(&mut self) -> Result<bool, SqlAdapterError> {
        if self.current_complete {
            return Ok(true);
        }
        self.load()
    }

    /// Number of rows in the result.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::NotCountable` for unbuffered results.
    pub fn count(&self) -> Result<usize, SqlAdapterError> {
        if self.buffered == Some(false) {
            return Err(SqlAdapterError::NotCountable);
        }
        match &self.source {
            RowSource::Direct(rows) => rows.num_rows().ok_or(SqlAdapterError::NotCountable),
            RowSource::Statement { handle, .. } => Ok(handle.num_rows()),
        }
    }

    /// Pull a statement result client side so it can be counted and rewound.
    /// Direct results are left alone.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::Buffering` once iteration has started.
    pub fn buffer(&mut self) -> Result<(), SqlAdapterError> {
        if let RowSource::Statement { handle, .. } = &mut self.source {
            if self.position > 0 {
                return Err(SqlAdapterError::Buffering);
            }
            handle.store_result()?;
            self.buffered = Some(true);
        }
        Ok(())
    }

    /// Override what is known about buffering.
    pub fn set_buffered(&mut self, buffered: bool) {
        self.buffered = Some(buffered);
    }

    /// `Some(true)` buffered, `Some(false)` streamed, `None` not yet known.
    #[must_use]
    pub fn is_buffered(&self) -> Option<bool> {
        self.buffered
    }

    /// Rows written by a statement, or rows returned by a direct query.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        match &self.source {
            RowSource::Statement { handle, .. } => handle.affected_rows(),
            RowSource::Direct(rows) => {
                if rows.columns().is_empty() {
                    rows.affected_rows()
                } else {
                    rows.num_rows()
                        .map_or_else(|| rows.affected_rows(), |n| n as u64)
                }
            }
        }
    }

    /// Identity or sequence value captured when the statement ran.
    #[must_use]
    pub fn generated_value(&self) -> Option<&RowValues> {
        self.generated_value.as_ref()
    }

    #[must_use]
    pub fn field_count(&self) -> usize {
        match &self.source {
            RowSource::Direct(rows) => rows.columns().len(),
            RowSource::Statement { handle, binding, .. } => binding
                .as_ref()
                .map_or_else(|| handle.field_count(), |b| b.columns().len()),
        }
    }

    /// Column names in result order.
    ///
    /// # Errors
    /// Returns `SqlAdapterError::Native` if statement metadata is unavailable.
    pub fn column_names(&mut self) -> Result<Vec<String>, SqlAdapterError> {
        match &mut self.source {
            RowSource::Direct(rows) => Ok(rows.columns().names().to_vec()),
            RowSource::Statement {
                binding: Some(binding),
                ..
            } => Ok(binding.columns().names().to_vec()),
            RowSource::Statement { handle, .. } => Ok(handle.result_metadata()?),
        }
    }

    /// Whether the statement returned rows rather than only touching them.
    #[must_use]
    pub fn is_query_result(&self) -> bool {
        self.field_count() > 0
    }

    /// Benign diagnostics the native client reported for this statement.
    #[must_use]
    pub fn warnings(&self) -> &[NativeDiagnostic] {
        &self.warnings
    }

    /// Iterate the remaining rows from the cursor onwards.
    pub fn rows(&mut self) -> Rows<'_, 's> {
        Rows {
            result: self,
            done: false,
        }
    }

    fn load(&mut self) -> Result<bool, SqlAdapterError> {
        match self.fetch_native()? {
            Some(row) => {
                self.current = Some(row);
                self.current_complete = true;
                self.next_complete = true;
                self.position += 1;
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    fn fetch_native(&mut self) -> Result<Option<Row>, SqlAdapterError> {
        let streamed = self.buffered == Some(false);
        match &mut self.source {
            RowSource::Direct(rows) => Ok(rows.fetch_assoc()?),
            RowSource::Statement {
                handle,
                binding,
                freed,
            } => {
                if *freed {
                    return Ok(None);
                }
                if binding.is_none() {
                    let names = handle.result_metadata()?;
                    handle.bind_result(names.len())?;
                    *binding = Some(OutputBinding::new(names));
                }
                let Some(binding) = binding.as_mut() else {
                    return Ok(None);
                };
                if handle.fetch(&mut binding.slots)? {
                    return Ok(Some(binding.snapshot()));
                }
                if streamed {
                    handle.free_result();
                    *freed = true;
                }
                Ok(None)
            }
        }
    }
}

impl fmt::Debug for ResultSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            RowSource::Direct(_) => "direct",
            RowSource::Statement { .. } => "statement",
        };
        f.debug_struct("ResultSet")
            .field("source", &kind)
            .field("buffered", &self.buffered)
            .field("position", &self.position)
            .field("current_complete", &self.current_complete)
            .field("next_complete", &self.next_complete)
            .field("generated_value", &self.generated_value)
            .finish_non_exhaustive()
    }
}

/// Iterator over the rows left in a [`ResultSet`]. Stops after the first error.
pub struct Rows<'r, 's> {
    result: &'r mut ResultSet<'s>,
    done: bool,
}

impl Rows<'_, '_> {
    fn step(&mut self) -> Result<Option<Row>, SqlAdapterError> {
        if !self.result.valid()? {
            return Ok(None);
        }
        let row = self.result.current()?.cloned();
        self.result.next()?;
        Ok(row)
    }
}

impl Iterator for Rows<'_, '_> {
    type Item = Result<Row, SqlAdapterError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{Materialized, MaterializedStatement, StatementRunner};

    fn numbers(n: i64) -> Vec<Vec<RowValues>> {
        (1..=n).map(|i| vec![RowValues::Int(i)]).collect()
    }

    fn buffered(n: i64) -> ResultSet<'static> {
        let rows = BufferedRows::new(Columns::new(vec!["n".into()]), numbers(n), 0);
        ResultSet::from_rows(Box::new(rows), None)
    }

    struct Numbers(i64);

    impl StatementRunner for Numbers {
        fn columns(&self) -> Vec<String> {
            vec!["n".to_string()]
        }

        fn run(&mut self, _params: &[RowValues]) -> Result<Materialized, NativeDiagnostic> {
            Ok(Materialized {
                columns: Columns::new(self.columns()),
                rows: numbers(self.0),
                affected: 0,
            })
        }
    }

    fn statement(n: i64) -> Box<dyn NativeStatement> {
        let mut stmt: Box<dyn NativeStatement> =
            Box::new(MaterializedStatement::new(Numbers(n), false));
        stmt.execute(&[]).unwrap();
        stmt
    }

    fn value(result: &mut ResultSet<'_>) -> Option<i64> {
        result
            .current()
            .unwrap()
            .and_then(|row| row.get("n"))
            .and_then(RowValues::as_int)
            .copied()
    }

    #[test]
    fn current_does_not_advance_twice() {
        let mut result = buffered(3);
        assert_eq!(result.key(), 0);
        assert_eq!(value(&mut result), Some(1));
        assert_eq!(value(&mut result), Some(1));
        assert_eq!(result.key(), 0);
        result.next().unwrap();
        assert_eq!(result.key(), 1);
        assert_eq!(value(&mut result), Some(2));
    }

    #[test]
    fn next_without_current_skips_a_row() {
        let mut result = buffered(3);
        result.next().unwrap();
        assert_eq!(result.key(), 1);
        assert_eq!(value(&mut result), Some(2));
    }

    #[test]
    fn next_past_the_end_keeps_the_key() {
        let mut result = buffered(2);
        for _ in 0..5 {
            result.next().unwrap();
        }
        assert_eq!(result.key(), 2);
        assert!(!result.valid().unwrap());
        assert_eq!(result.key(), 2);
        result.rewind().unwrap();
        assert_eq!(value(&mut result), Some(1));
    }

    #[test]
    fn buffered_results_rewind_and_count() {
        let mut result = buffered(3);
        let first: Vec<_> = result.rows().map(Result::unwrap).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(result.count().unwrap(), 3);
        assert!(!result.valid().unwrap());
        result.rewind().unwrap();
        assert_eq!(result.key(), 0);
        let second: Vec<_> = result.rows().map(Result::unwrap).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn rewind_at_start_is_a_no_op_even_when_streamed() {
        let mut result = buffered(1);
        result.set_buffered(false);
        result.rewind().unwrap();
        result.next().unwrap();
        assert!(
            matches!(result.rewind(), Err(SqlAdapterError::NonRewindable))
        );
        assert!(matches!(result.count(), Err(SqlAdapterError::NotCountable)));
    }

    #[test]
    fn statement_buffering_starts_unknown() {
        let mut handle = statement(2);
        let mut result = ResultSet::from_statement(&mut handle, None, None);
        assert_eq!(result.is_buffered(), None);
        assert_eq!(result.count().unwrap(), 0);
        result.buffer().unwrap();
        assert_eq!(result.is_buffered(), Some(true));
        assert_eq!(result.count().unwrap(), 2);
        assert_eq!(result.column_names().unwrap(), vec!["n".to_string()]);
    }

    #[test]
    fn statement_buffer_after_next_fails() {
        let mut handle = statement(2);
        let mut result = ResultSet::from_statement(&mut handle, None, None);
        result.next().unwrap();
        assert!(matches!(result.buffer(), Err(SqlAdapterError::Buffering)));
    }

    #[test]
    fn statement_rows_are_copies_of_the_slots() {
        let mut handle = statement(2);
        let mut result = ResultSet::from_statement(&mut handle, Some(true), None);
        let rows: Vec<_> = result.rows().map(Result::unwrap).collect();
        assert_eq!(rows[0].get("n"), Some(&RowValues::Int(1)));
        assert_eq!(rows[1].get("n"), Some(&RowValues::Int(2)));
    }

    #[test]
    fn unbuffered_statement_is_freed_at_end() {
        let mut handle = statement(1);
        {
            let mut result = ResultSet::from_statement(&mut handle, Some(false), None);
            assert_eq!(result.rows().count(), 1);
            assert!(!result.valid().unwrap());
        }
        assert_eq!(handle.num_rows(), 0);
        assert_eq!(handle.field_count(), 1);
    }

    #[test]
    fn warning_result_is_empty_and_buffered() {
        let mut result = ResultSet::from_warning(
            NativeDiagnostic::new("Changed database context").with_sqlstate("01000"),
        );
        assert_eq!(result.is_buffered(), Some(true));
        assert!(!result.valid().unwrap());
        assert_eq!(result.count().unwrap(), 0);
        assert_eq!(result.warnings().len(), 1);
        assert!(!result.is_query_result());
    }

    #[test]
    fn affected_rows_depends_on_the_source() {
        let write = ResultSet::from_rows(Box::new(BufferedRows::affected(4)), None);
        assert_eq!(write.affected_rows(), 4);
        assert_eq!(buffered(3).affected_rows(), 3);
    }
}
