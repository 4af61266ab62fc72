// SQL Server backend over tiberius
//
// - params: `ToSql` for `RowValues` and query binding
// - query: value extraction and result materialization
// - session: the blocking native driver and session

pub mod params;
pub mod query;
pub mod session;

pub use params::bind_query_params;
pub use session::MssqlDriver;
