//! Blocking database access over one connection per backend.
//!
//! A [`Connection`] turns [`ConnectionParameters`] into a native session,
//! flattens nested transactions and hands results back as a [`ResultSet`]
//! cursor. [`Platform`] quotes identifiers and values per dialect, and
//! [`Driver`] ties the two together.
//!
//! Native clients sit behind the traits in [`native`]; `sqlite`, `postgres`
//! and `mssql` adapters are compiled in through cargo features, and
//! [`native::memory`] provides a scripted backend for tests.

pub mod config;
pub mod connection;
pub mod driver;
pub mod dsn;
pub mod error;
pub mod native;
pub mod platform;
pub mod prelude;
pub mod profiler;
pub mod results;
pub mod statement;
pub mod types;

#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use config::ConnectionParameters;
pub use connection::{Connection, native_driver_for};
pub use driver::{Driver, NameFormat, PrepareType};
pub use dsn::Dsn;
pub use error::{NativeDiagnostic, SqlAdapterError};
pub use native::FetchMode;
pub use platform::{ConnectedPlatform, Dialect, Platform};
pub use profiler::{Profile, Profiler, QueryProfiler};
pub use results::{Columns, ResultSet, Row, Rows};
pub use statement::Statement;
pub use types::{Backend, RowValues};
