use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::ConnectionParameters;
use crate::dsn::Dsn;
use crate::error::NativeDiagnostic;
use crate::native::{
    BufferedRows, FetchMode, Materialized, MaterializedStatement, NativeDriver, NativeRows,
    NativeSession, NativeStatement, StatementRunner,
};
use crate::types::RowValues;

use super::query::materialize;

/// Connection shared between a session and the statements it prepared.
pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

fn lock(conn: &SharedSqliteConnection) -> MutexGuard<'_, rusqlite::Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens `SQLite` databases. The connection-string body is the file path;
/// an empty body or `:memory:` opens a private in-memory database.
///
/// Recognized backend options: `busy_timeout` (milliseconds).
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl NativeDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn connect(
        &self,
        dsn: &Dsn,
        params: &ConnectionParameters,
    ) -> Result<Box<dyn NativeSession>, NativeDiagnostic> {
        let path = dsn.body().trim();
        let conn = if path.is_empty() || path == ":memory:" {
            rusqlite::Connection::open_in_memory()?
        } else {
            rusqlite::Connection::open(path)?
        };

        if let Some(timeout) = params.option("busy_timeout") {
            let millis = timeout.parse::<u64>().map_err(|_| {
                NativeDiagnostic::new(format!("invalid busy_timeout `{timeout}`"))
            })?;
            conn.busy_timeout(Duration::from_millis(millis))?;
        }

        Ok(Box::new(SqliteSession {
            conn: Arc::new(Mutex::new(conn)),
        }))
    }
}

struct SqliteSession {
    conn: SharedSqliteConnection,
}

impl NativeSession for SqliteSession {
    fn backend_name(&self) -> String {
        "sqlite".to_string()
    }

    // SQLite results are always read into memory, so the fetch mode is moot
    fn query(
        &mut self,
        sql: &str,
        _mode: FetchMode,
    ) -> Result<Box<dyn NativeRows>, NativeDiagnostic> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(sql)?;
        let Materialized {
            columns,
            rows,
            affected,
        } = materialize(&mut stmt, &[])?;
        Ok(Box::new(BufferedRows::new(columns, rows, affected)))
    }

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement>, NativeDiagnostic> {
        let columns = {
            let conn = lock(&self.conn);
            let stmt = conn.prepare_cached(sql)?;
            stmt.column_names()
                .iter()
                .map(std::string::ToString::to_string)
                .collect()
        };
        let runner = SqliteRunner {
            conn: Arc::clone(&self.conn),
            sql: sql.to_string(),
            columns,
        };
        Ok(Box::new(MaterializedStatement::new(runner, true)))
    }

    fn begin_transaction(&mut self) -> Result<(), NativeDiagnostic> {
        lock(&self.conn).execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), NativeDiagnostic> {
        lock(&self.conn).execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), NativeDiagnostic> {
        lock(&self.conn).execute_batch("ROLLBACK")?;
        Ok(())
    }

    // rowids are per connection; sequence names do not exist here
    fn last_insert_id(
        &mut self,
        _name: Option<&str>,
    ) -> Result<Option<RowValues>, NativeDiagnostic> {
        Ok(Some(RowValues::Int(lock(&self.conn).last_insert_rowid())))
    }

    fn escape_string(&self, value: &str) -> Option<String> {
        Some(value.replace('\'', "''"))
    }
}

struct SqliteRunner {
    conn: SharedSqliteConnection,
    sql: String,
    columns: Vec<String>,
}

impl StatementRunner for SqliteRunner {
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn run(&mut self, params: &[RowValues]) -> Result<Materialized, NativeDiagnostic> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare_cached(&self.sql)?;
        materialize(&mut stmt, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Box<dyn NativeSession> {
        let dsn = Dsn::parse("sqlite::memory:").unwrap();
        SqliteDriver
            .connect(&dsn, &ConnectionParameters::new())
            .unwrap_or_else(|e| panic!("open failed: {e}"))
    }

    #[test]
    fn direct_queries_are_buffered() {
        let mut session = session();
        session
            .query(
                "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)",
                FetchMode::Buffered,
            )
            .unwrap_or_else(|e| panic!("{e}"));
        let insert = session
            .query(
                "INSERT INTO t (name) VALUES ('a'), ('b')",
                FetchMode::Unbuffered,
            )
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(insert.affected_rows(), 2);

        let rows = session
            .query("SELECT id, name FROM t ORDER BY id", FetchMode::Unbuffered)
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(rows.is_buffered());
        assert_eq!(rows.num_rows(), Some(2));
        assert_eq!(
            session.last_insert_id(None).unwrap(),
            Some(RowValues::Int(2))
        );
    }

    #[test]
    fn prepared_statements_store_on_execute() {
        let mut session = session();
        session
            .query("CREATE TABLE t (n INTEGER)", FetchMode::Buffered)
            .unwrap_or_else(|e| panic!("{e}"));
        let mut insert = session
            .prepare("INSERT INTO t (n) VALUES (?1)")
            .unwrap_or_else(|e| panic!("{e}"));
        for n in 1..=3 {
            insert.execute(&[RowValues::Int(n)]).unwrap();
            assert_eq!(insert.affected_rows(), 1);
        }

        let mut select = session
            .prepare("SELECT n FROM t WHERE n >= ?1 ORDER BY n")
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(select.field_count(), 1);
        select.execute(&[RowValues::Int(2)]).unwrap();
        assert_eq!(select.num_rows(), 2);
    }

    #[test]
    fn failures_carry_the_extended_code() {
        let mut session = session();
        let err = session
            .query("SELECT * FROM missing", FetchMode::Buffered)
            .err()
            .unwrap();
        assert!(err.message.contains("no such table"));
        assert!(err.code.is_some());
    }
}
