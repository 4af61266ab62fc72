use std::error::Error;

use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::types::RowValues;

/// Container for Postgres parameters with lifetime tracking
pub struct Params<'a> {
    references: Vec<&'a (dyn ToSql + Sync)>,
}

impl<'a> Params<'a> {
    /// Convert from a slice of `RowValues` to Postgres parameters
    #[must_use]
    pub fn convert(params: &'a [RowValues]) -> Params<'a> {
        let references = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        Params { references }
    }

    /// Get a reference to the underlying parameter array
    #[must_use]
    pub fn as_refs(&self) -> &[&(dyn ToSql + Sync)] {
        &self.references
    }
}

impl ToSql for RowValues {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            // integers narrow to the declared column width
            RowValues::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                _ => (*i).to_sql(ty, out),
            },
            #[allow(clippy::cast_possible_truncation)]
            RowValues::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => (*f).to_sql(ty, out),
            },
            RowValues::Text(s) => s.to_sql(ty, out),
            RowValues::Bool(b) => (*b).to_sql(ty, out),
            RowValues::Timestamp(dt) => match *ty {
                Type::TIMESTAMPTZ => dt.and_utc().to_sql(ty, out),
                Type::DATE => dt.date().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            RowValues::Null => Ok(IsNull::Yes),
            RowValues::JSON(jsval) => jsval.to_sql(ty, out),
            RowValues::Blob(bytes) => bytes.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::CHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::UNKNOWN
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
        )
    }

    to_sql_checked!();
}
