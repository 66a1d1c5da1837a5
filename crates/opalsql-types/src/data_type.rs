//! SQL data type definitions

/// The type of a column or expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Double,
    Varchar { max_length: Option<usize> },
    Boolean,
    Date,
    Time,
    Timestamp,
    Bytes,
    /// Special type for NULL literals before type inference.
    Null,
}

impl DataType {
    /// Check if this type is compatible with another type for comparisons.
    ///
    /// NULL is compatible with any type, numeric types are compatible with
    /// each other, and types are compatible with themselves.
    pub fn is_compatible_with(&self, other: &DataType) -> bool {
        if matches!(self, DataType::Null) || matches!(other, DataType::Null) {
            return true;
        }
        match (self, other) {
            (DataType::Integer, DataType::Integer) => true,
            (DataType::Double, DataType::Double) => true,
            (DataType::Integer, DataType::Double) | (DataType::Double, DataType::Integer) => true,
            (DataType::Varchar { .. }, DataType::Varchar { .. }) => true,
            (DataType::Boolean, DataType::Boolean) => true,
            (DataType::Date, DataType::Date) => true,
            (DataType::Time, DataType::Time) => true,
            (DataType::Timestamp, DataType::Timestamp) => true,
            (DataType::Bytes, DataType::Bytes) => true,
            _ => false,
        }
    }

    /// Whether values of this type support ordering comparisons.
    ///
    /// Byte strings are excluded, mirroring the treatment of large binary
    /// objects: they can be stored and returned but not compared in
    /// parameterized predicates.
    pub fn is_comparable(&self) -> bool {
        !matches!(self, DataType::Bytes)
    }
}
