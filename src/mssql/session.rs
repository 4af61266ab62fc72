use std::net::ToSocketAddrs;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tiberius::{AuthMethod, Client};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::config::ConnectionParameters;
use crate::dsn::Dsn;
use crate::error::NativeDiagnostic;
use crate::native::{
    BufferedRows, FetchMode, Materialized, MaterializedStatement, NativeDriver, NativeRows,
    NativeSession, NativeStatement, StatementRunner,
};
use crate::types::RowValues;

use super::query::materialize;

/// Type alias for SQL Server client
pub type MssqlClient = Client<Compat<TcpStream>>;

const DEFAULT_PORT: u16 = 1433;

struct MsShared {
    runtime: Runtime,
    client: Mutex<MssqlClient>,
}

impl MsShared {
    fn client(&self) -> MutexGuard<'_, MssqlClient> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(
        &self,
        sql: &str,
        params: Option<&[RowValues]>,
    ) -> Result<Materialized, NativeDiagnostic> {
        let mut client = self.client();
        self.runtime.block_on(materialize(&mut client, sql, params))
    }

    fn batch(&self, sql: &str) -> Result<(), NativeDiagnostic> {
        let mut client = self.client();
        self.runtime.block_on(async {
            client.simple_query(sql).await?.into_results().await?;
            Ok::<(), NativeDiagnostic>(())
        })
    }
}

/// Where to reach the server: `server=host[\instance][,port]` for `sqlsrv`,
/// `host=`/`port=` for `dblib`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ServerAddress {
    host: String,
    instance: Option<String>,
    port: Option<u16>,
}

impl ServerAddress {
    fn from_dsn(dsn: &Dsn) -> Result<Self, NativeDiagnostic> {
        let raw = dsn
            .get("server")
            .or_else(|| dsn.get("host"))
            .unwrap_or("localhost");
        let (rest, port) = match raw.split_once(',') {
            Some((rest, port)) => (rest, Some(port)),
            None => (raw, dsn.get("port")),
        };
        let port = port
            .map(|p| {
                p.trim()
                    .parse::<u16>()
                    .map_err(|_| NativeDiagnostic::new(format!("invalid port `{p}`")))
            })
            .transpose()?;
        let (host, instance) = match rest.split_once('\\') {
            Some((host, instance)) => (host, Some(instance.to_string())),
            None => (rest, None),
        };
        Ok(Self {
            host: host.trim().to_string(),
            instance,
            port,
        })
    }
}

/// Blocking SQL Server driver for the `sqlsrv` and `dblib` grammars.
///
/// Each session owns a `tokio` runtime and drives `tiberius` on it. Recognized
/// backend options: `trust_server_certificate` (default `true`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDriver;

impl NativeDriver for MssqlDriver {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn connect(
        &self,
        dsn: &Dsn,
        params: &ConnectionParameters,
    ) -> Result<Box<dyn NativeSession>, NativeDiagnostic> {
        let address = ServerAddress::from_dsn(dsn)?;
        let port = address.port.unwrap_or(DEFAULT_PORT);

        let mut config = tiberius::Config::new();
        config.host(&address.host);
        config.port(port);
        if let Some(instance) = &address.instance {
            config.instance_name(instance);
        }
        if let Some(database) = dsn.get("database").or_else(|| dsn.get("dbname")) {
            config.database(database);
        }
        config.authentication(AuthMethod::sql_server(
            params.username.as_deref().unwrap_or_default(),
            params.password.as_deref().unwrap_or_default(),
        ));
        if params.option("trust_server_certificate").as_deref() != Some("false") {
            config.trust_cert();
        }

        let server_addr = (address.host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| NativeDiagnostic::new(format!("Failed to resolve server address: {e}")))?
            .next()
            .ok_or_else(|| {
                NativeDiagnostic::new(format!("No valid address found for {}", address.host))
            })?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| NativeDiagnostic::new(format!("failed to start runtime: {e}")))?;

        let client = runtime.block_on(async {
            let tcp = TcpStream::connect(server_addr)
                .await
                .map_err(|e| NativeDiagnostic::new(format!("TCP connection error: {e}")))?;
            tcp.set_nodelay(true)
                .map_err(|e| NativeDiagnostic::new(format!("TCP connection error: {e}")))?;
            Client::connect(config, tcp.compat_write())
                .await
                .map_err(NativeDiagnostic::from)
        })?;

        Ok(Box::new(MssqlSession {
            shared: Arc::new(MsShared {
                runtime,
                client: Mutex::new(client),
            }),
            backend: dsn.backend().to_string(),
        }))
    }
}

struct MssqlSession {
    shared: Arc<MsShared>,
    backend: String,
}

impl NativeSession for MssqlSession {
    fn backend_name(&self) -> String {
        self.backend.clone()
    }

    // tiberius reads whole results; streaming is not offered
    fn query(
        &mut self,
        sql: &str,
        _mode: FetchMode,
    ) -> Result<Box<dyn NativeRows>, NativeDiagnostic> {
        let Materialized {
            columns,
            rows,
            affected,
        } = self.shared.run(sql, None)?;
        Ok(Box::new(BufferedRows::new(columns, rows, affected)))
    }

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement>, NativeDiagnostic> {
        let runner = MssqlRunner {
            shared: Arc::clone(&self.shared),
            sql: sql.to_string(),
            columns: Vec::new(),
        };
        Ok(Box::new(MaterializedStatement::new(runner, false)))
    }

    fn begin_transaction(&mut self) -> Result<(), NativeDiagnostic> {
        self.shared.batch("BEGIN TRANSACTION")
    }

    fn commit(&mut self) -> Result<(), NativeDiagnostic> {
        self.shared.batch("COMMIT TRANSACTION")
    }

    fn rollback(&mut self) -> Result<(), NativeDiagnostic> {
        self.shared.batch("ROLLBACK TRANSACTION")
    }

    fn last_insert_id(
        &mut self,
        name: Option<&str>,
    ) -> Result<Option<RowValues>, NativeDiagnostic> {
        let materialized = match name {
            Some(sequence) => {
                let params = [RowValues::Text(sequence.to_string())];
                self.shared.run(
                    "SELECT CAST(current_value AS BIGINT) FROM sys.sequences WHERE name = @P1",
                    Some(&params[..]),
                )?
            }
            None => self
                .shared
                .run("SELECT CAST(@@IDENTITY AS BIGINT)", None)?,
        };
        Ok(materialized
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .filter(|value| !value.is_null()))
    }

    fn escape_string(&self, value: &str) -> Option<String> {
        Some(value.replace('\'', "''"))
    }
}

struct MssqlRunner {
    shared: Arc<MsShared>,
    sql: String,
    columns: Vec<String>,
}

impl StatementRunner for MssqlRunner {
    // column names are only known once the statement has run
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn run(&mut self, params: &[RowValues]) -> Result<Materialized, NativeDiagnostic> {
        let materialized = self.shared.run(&self.sql, Some(params))?;
        self.columns = materialized.columns.names().to_vec();
        Ok(materialized)
    }
}
