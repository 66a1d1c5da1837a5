//! Comparison implementations for SqlValue

use std::cmp::Ordering;

use crate::sql_value::SqlValue;

/// Equality with grouping semantics.
///
/// - NULL == NULL (for GROUP BY / DISTINCT, unlike SQL comparison)
/// - NaN == NaN (compared via `to_bits`)
/// - Integer and Double compare numerically across variants
impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        use SqlValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Double(a), Double(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b
                }
            }
            (Integer(a), Double(b)) | (Double(b), Integer(a)) => (*a as f64) == *b,
            (Varchar(a), Varchar(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Time(a), Time(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for SqlValue {}

/// SQL three-valued comparison.
///
/// - comparisons involving NULL return `None` (SQL UNKNOWN)
/// - type mismatches return `None` (incomparable)
/// - Integer and Double compare numerically across variants
impl PartialOrd for SqlValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use SqlValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Boolean(a), Boolean(b)) => a.partial_cmp(b),
            (Integer(a), Integer(b)) => a.partial_cmp(b),
            (Double(a), Double(b)) => a.partial_cmp(b),
            (Integer(a), Double(b)) => (*a as f64).partial_cmp(b),
            (Double(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Varchar(a), Varchar(b)) => a.partial_cmp(b),
            (Bytes(a), Bytes(b)) => a.partial_cmp(b),
            (Date(a), Date(b)) => a.partial_cmp(b),
            (Time(a), Time(b)) => a.partial_cmp(b),
            (Timestamp(a), Timestamp(b)) => a.partial_cmp(b),
            (Array(a), Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.partial_cmp(y) {
                        Some(Ordering::Equal) => continue,
                        other => return other,
                    }
                }
                a.len().partial_cmp(&b.len())
            }
            _ => None,
        }
    }
}

/// Total order used for index keys and internal sorting.
///
/// NULL sorts before every other value, NaN sorts after every other
/// double, and type mismatches fall back to a fixed type rank so that
/// heterogeneous keys still have a stable order.
impl Ord for SqlValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use SqlValue::*;
        match (self, other) {
            (Null, Null) => return Ordering::Equal,
            (Null, _) => return Ordering::Less,
            (_, Null) => return Ordering::Greater,
            _ => {}
        }
        if let Some(ord) = self.partial_cmp(other) {
            return ord;
        }
        match (self, other) {
            (Double(a), Double(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => Ordering::Equal,
            },
            (Integer(_), Double(b)) if b.is_nan() => Ordering::Less,
            (Double(a), Integer(_)) if a.is_nan() => Ordering::Greater,
            (Array(a), Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cmp(y) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => type_rank(self).cmp(&type_rank(other)),
        }
    }
}

fn type_rank(value: &SqlValue) -> u8 {
    use SqlValue::*;
    match value {
        Null => 0,
        Boolean(_) => 1,
        Integer(_) | Double(_) => 2,
        Varchar(_) => 3,
        Bytes(_) => 4,
        Date(_) => 5,
        Time(_) => 6,
        Timestamp(_) => 7,
        Array(_) => 8,
    }
}

/// Compare two values under the total order.
///
/// Convenience wrapper used by sorting and index maintenance code.
pub fn compare_sql_values(a: &SqlValue, b: &SqlValue) -> Ordering {
    a.cmp(b)
}
