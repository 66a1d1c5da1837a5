//! SQL value representation

mod comparison;
mod display;
mod hash;

pub use comparison::compare_sql_values;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A single SQL value.
///
/// `Array` is a composite value (an ordered sequence of values) used as a
/// map key during grouping and DISTINCT processing; it never appears in a
/// stored table row.
#[derive(Debug, Clone)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Varchar(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Array(Vec<SqlValue>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlValue::Integer(_) | SqlValue::Double(_))
    }

    /// SQL boolean interpretation. NULL has no boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Boolean(b) => Some(*b),
            SqlValue::Integer(i) => Some(*i != 0),
            SqlValue::Null => None,
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Double(d) => Some(*d as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(i) => Some(*i as f64),
            SqlValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Boolean(_) => "BOOLEAN",
            SqlValue::Integer(_) => "INTEGER",
            SqlValue::Double(_) => "DOUBLE",
            SqlValue::Varchar(_) => "VARCHAR",
            SqlValue::Bytes(_) => "BYTES",
            SqlValue::Date(_) => "DATE",
            SqlValue::Time(_) => "TIME",
            SqlValue::Timestamp(_) => "TIMESTAMP",
            SqlValue::Array(_) => "ARRAY",
        }
    }
}
