// PostgreSQL backend over tokio-postgres
//
// - params: `ToSql` for `RowValues`
// - query: value extraction
// - session: the blocking native driver, session, streamed rows and statements

pub mod params;
pub mod query;
pub mod session;

pub use params::Params;
pub use query::postgres_extract_value;
pub use session::PostgresDriver;
