use std::fmt;

use crate::native::NativeStatement;

/// A prepared statement owned by the caller.
///
/// Execute it through [`Connection::execute_prepared`](crate::Connection::execute_prepared);
/// the resulting [`ResultSet`](crate::ResultSet) borrows the statement.
pub struct Statement {
    sql: String,
    handle: Box<dyn NativeStatement>,
    buffer_results: Option<bool>,
}

impl Statement {
    pub(crate) fn new(sql: &str, handle: Box<dyn NativeStatement>) -> Self {
        Self {
            sql: sql.to_string(),
            handle,
            buffer_results: None,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// `Some(true)` stores every result client side as soon as it runs;
    /// `Some(false)` marks results as forward-only.
    #[must_use]
    pub fn with_buffer_results(mut self, buffer: bool) -> Self {
        self.buffer_results = Some(buffer);
        self
    }

    pub fn set_buffer_results(&mut self, buffer: Option<bool>) {
        self.buffer_results = buffer;
    }

    #[must_use]
    pub fn buffer_results(&self) -> Option<bool> {
        self.buffer_results
    }

    pub(crate) fn parts_mut(&mut self) -> (&str, &mut Box<dyn NativeStatement>, Option<bool>) {
        (&self.sql, &mut self.handle, self.buffer_results)
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("buffer_results", &self.buffer_results)
            .finish_non_exhaustive()
    }
}
