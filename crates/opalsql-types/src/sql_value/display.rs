//! SQL-literal formatting for SqlValue

use std::fmt;

use crate::sql_value::SqlValue;

/// Renders the value as a SQL literal, used by the plan printer.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Double(d) => write!(f, "{}", d),
            SqlValue::Varchar(s) => write!(f, "'{}'", s.replace('\'', "''")),
            SqlValue::Bytes(b) => {
                write!(f, "X'")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, "'")
            }
            SqlValue::Date(d) => write!(f, "DATE '{}'", d),
            SqlValue::Time(t) => write!(f, "TIME '{}'", t),
            SqlValue::Timestamp(t) => write!(f, "TIMESTAMP '{}'", t),
            SqlValue::Array(values) => {
                write!(f, "(")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
        }
    }
}
