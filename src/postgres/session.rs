use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::TryStreamExt;
use tokio::runtime::Runtime;
use tokio_postgres::{Client, NoTls, RowStream};

use crate::config::ConnectionParameters;
use crate::dsn::Dsn;
use crate::error::NativeDiagnostic;
use crate::native::{
    BufferedRows, FetchMode, Materialized, MaterializedStatement, NativeDriver, NativeRows,
    NativeSession, NativeStatement, StatementRunner,
};
use crate::results::{Columns, Row};
use crate::types::RowValues;

use super::params::Params;
use super::query::{row_values, statement_columns};

/// Client plus the private runtime every call is driven on.
struct PgShared {
    runtime: Runtime,
    client: Client,
}

impl PgShared {
    fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn materialize(
        &self,
        stmt: &tokio_postgres::Statement,
        params: &[RowValues],
    ) -> Result<Materialized, NativeDiagnostic> {
        let params = Params::convert(params);
        if stmt.columns().is_empty() {
            let affected = self.block_on(self.client.execute(stmt, params.as_refs()))?;
            return Ok(Materialized {
                affected,
                ..Materialized::default()
            });
        }
        let rows = self.block_on(self.client.query(stmt, params.as_refs()))?;
        Ok(Materialized {
            columns: statement_columns(stmt),
            rows: rows.iter().map(row_values).collect::<Result<_, _>>()?,
            affected: 0,
        })
    }
}

/// Blocking `PostgreSQL` driver.
///
/// Each session owns a current-thread `tokio` runtime and drives
/// `tokio-postgres` on it, so it must not be used from inside another async
/// runtime. Recognized backend options: `connect_timeout` (seconds) and
/// `application_name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    fn config(
        dsn: &Dsn,
        params: &ConnectionParameters,
    ) -> Result<tokio_postgres::Config, NativeDiagnostic> {
        let mut config = tokio_postgres::Config::new();
        if let Some(host) = dsn.get("host").or_else(|| dsn.get("unix_socket")) {
            config.host(host);
        }
        if let Some(port) = dsn.get("port") {
            let port = port
                .parse::<u16>()
                .map_err(|_| NativeDiagnostic::new(format!("invalid port `{port}`")))?;
            config.port(port);
        }
        if let Some(dbname) = dsn.get("dbname") {
            config.dbname(dbname);
        }
        if let Some(user) = &params.username {
            config.user(user);
        }
        if let Some(password) = &params.password {
            config.password(password);
        }
        if let Some(timeout) = params.option("connect_timeout") {
            let secs = timeout.parse::<u64>().map_err(|_| {
                NativeDiagnostic::new(format!("invalid connect_timeout `{timeout}`"))
            })?;
            config.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(name) = params.option("application_name") {
            config.application_name(&name);
        }
        Ok(config)
    }
}

impl NativeDriver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn connect(
        &self,
        dsn: &Dsn,
        params: &ConnectionParameters,
    ) -> Result<Box<dyn NativeSession>, NativeDiagnostic> {
        let config = Self::config(dsn, params)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| NativeDiagnostic::new(format!("failed to start runtime: {e}")))?;

        let (client, connection) = runtime.block_on(config.connect(NoTls))?;
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection task failed");
            }
        });

        Ok(Box::new(PostgresSession {
            shared: Arc::new(PgShared { runtime, client }),
        }))
    }
}

struct PostgresSession {
    shared: Arc<PgShared>,
}

impl NativeSession for PostgresSession {
    fn backend_name(&self) -> String {
        "pgsql".to_string()
    }

    fn query(
        &mut self,
        sql: &str,
        mode: FetchMode,
    ) -> Result<Box<dyn NativeRows>, NativeDiagnostic> {
        let shared = &self.shared;
        let stmt = shared.block_on(shared.client.prepare(sql))?;

        if mode == FetchMode::Buffered || stmt.columns().is_empty() {
            let Materialized {
                columns,
                rows,
                affected,
            } = shared.materialize(&stmt, &[])?;
            return Ok(Box::new(BufferedRows::new(columns, rows, affected)));
        }

        let no_params: [RowValues; 0] = [];
        let stream = shared.block_on(shared.client.query_raw(&stmt, no_params.iter()))?;
        Ok(Box::new(StreamedRows {
            shared: Arc::clone(shared),
            columns: statement_columns(&stmt),
            stream: Box::pin(stream),
            fetched: 0,
            exhausted: false,
        }))
    }

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement>, NativeDiagnostic> {
        let stmt = self.shared.block_on(self.shared.client.prepare(sql))?;
        let runner = PostgresRunner {
            shared: Arc::clone(&self.shared),
            stmt,
        };
        Ok(Box::new(MaterializedStatement::new(runner, false)))
    }

    fn begin_transaction(&mut self) -> Result<(), NativeDiagnostic> {
        self.shared.block_on(self.shared.client.batch_execute("BEGIN"))?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), NativeDiagnostic> {
        self.shared.block_on(self.shared.client.batch_execute("COMMIT"))?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), NativeDiagnostic> {
        self.shared.block_on(self.shared.client.batch_execute("ROLLBACK"))?;
        Ok(())
    }

    fn last_insert_id(
        &mut self,
        name: Option<&str>,
    ) -> Result<Option<RowValues>, NativeDiagnostic> {
        let Some(sequence) = name else {
            return Ok(None);
        };
        let row = self.shared.block_on(
            self.shared
                .client
                .query_one("SELECT currval($1::text::regclass)", &[&sequence]),
        )?;
        let value: i64 = row.try_get(0)?;
        Ok(Some(RowValues::Int(value)))
    }

    // standard_conforming_strings is on by default since 9.1
    fn escape_string(&self, value: &str) -> Option<String> {
        Some(value.replace('\'', "''"))
    }
}

/// Rows pulled from the server one at a time.
struct StreamedRows {
    shared: Arc<PgShared>,
    columns: Columns,
    stream: Pin<Box<RowStream>>,
    fetched: usize,
    // a drained RowStream reports `closed` when polled again
    exhausted: bool,
}

impl NativeRows for StreamedRows {
    fn columns(&self) -> &Columns {
        &self.columns
    }

    fn fetch_assoc(&mut self) -> Result<Option<Row>, NativeDiagnostic> {
        if self.exhausted {
            return Ok(None);
        }
        let next = self.shared.block_on(self.stream.as_mut().try_next())?;
        match next {
            Some(row) => {
                self.fetched += 1;
                Ok(Some(Row::new(self.columns.clone(), row_values(&row)?)))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn data_seek(&mut self, offset: usize) -> Result<(), NativeDiagnostic> {
        if offset == self.fetched {
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
        self.stream.rows_affected().unwrap_or(0)
    }
}

struct PostgresRunner {
    shared: Arc<PgShared>,
    stmt: tokio_postgres::Statement,
}

impl StatementRunner for PostgresRunner {
    fn columns(&self) -> Vec<String> {
        self.stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    fn run(&mut self, params: &[RowValues]) -> Result<Materialized, NativeDiagnostic> {
        self.shared.materialize(&self.stmt, params)
    }
}
