//! Rows and the cursor that reads them.

mod cursor;
mod row;

pub use cursor::{OutputBinding, ResultSet, Rows};
pub use row::{Columns, Row};
