//! Helpers for integration tests that need a real PostgreSQL server.
//!
//! Compiled only with the `test-utils` feature. The server binaries are bundled
//! by `postgresql_embedded`, so no external installation is needed.

use postgresql_embedded::PostgreSQL;
use tokio::runtime::Runtime;

use crate::config::ConnectionParameters;

/// A running embedded `PostgreSQL` instance and the parameters to reach it.
pub struct EmbeddedPostgres {
    runtime: Runtime,
    postgresql: PostgreSQL,
    pub parameters: ConnectionParameters,
}

/// Start an embedded `PostgreSQL` server and create `database` on it.
///
/// The returned parameters use the `pgsql` driver with the server's host, port
/// and generated credentials.
///
/// # Errors
/// Returns an error if the runtime cannot be built or the server cannot be set
/// up, started or provisioned.
pub fn setup_postgres_embedded(
    database: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let (postgresql, parameters) = runtime.block_on(async {
        let mut postgresql = PostgreSQL::default();
        postgresql.setup().await?;
        postgresql.start().await?;
        postgresql.create_database(database).await?;

        let settings = postgresql.settings();
        let parameters = ConnectionParameters::new()
            .with_driver("pgsql")
            .with_host(settings.host.clone())
            .with_port(settings.port)
            .with_database(database)
            .with_credentials(settings.username.clone(), settings.password.clone());
        tracing::debug!(port = settings.port, database, "embedded postgres started");
        Ok::<_, Box<dyn std::error::Error>>((postgresql, parameters))
    })?;

    Ok(EmbeddedPostgres {
        runtime,
        postgresql,
        parameters,
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
pub fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres {
        runtime,
        postgresql,
        ..
    } = postgres;
    runtime.block_on(async move {
        if let Err(error) = postgresql.stop().await {
            tracing::warn!(%error, "embedded postgres did not stop cleanly");
        }
    });
}
