//! Convenient imports for common functionality.
//!
//! This module re-exports the types most callers need to open a connection,
//! run SQL and walk the results.

pub use crate::config::ConnectionParameters;
pub use crate::connection::Connection;
pub use crate::driver::{Driver, NameFormat, PrepareType};
pub use crate::dsn::Dsn;
pub use crate::error::{NativeDiagnostic, SqlAdapterError};
pub use crate::native::FetchMode;
pub use crate::platform::{Dialect, Platform};
pub use crate::profiler::{Profiler, QueryProfiler};
pub use crate::results::{ResultSet, Row};
pub use crate::statement::Statement;
pub use crate::types::{Backend, RowValues};

#[cfg(feature = "mssql")]
pub use crate::mssql::MssqlDriver;
#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteDriver;
