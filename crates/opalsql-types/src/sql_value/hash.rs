//! Hash implementation for SqlValue

use std::hash::{Hash, Hasher};

use crate::sql_value::SqlValue;

/// Custom implementation to match the grouping equality:
/// - NaN values hash to the same value (via `to_bits`)
/// - NULL hashes to its discriminant alone
/// - Integer and Double hash through a common numeric form so that
///   cross-variant equal values land in the same bucket
impl Hash for SqlValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use SqlValue::*;
        match self {
            Null => 0u8.hash(state),
            Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Integer(i) => {
                2u8.hash(state);
                (*i as f64).to_bits().hash(state);
            }
            Double(d) => {
                2u8.hash(state);
                if d.is_nan() {
                    f64::NAN.to_bits().hash(state);
                } else {
                    d.to_bits().hash(state);
                }
            }
            Varchar(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Bytes(b) => {
                4u8.hash(state);
                b.hash(state);
            }
            Date(d) => {
                5u8.hash(state);
                d.hash(state);
            }
            Time(t) => {
                6u8.hash(state);
                t.hash(state);
            }
            Timestamp(t) => {
                7u8.hash(state);
                t.hash(state);
            }
            Array(values) => {
                8u8.hash(state);
                for v in values {
                    v.hash(state);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &SqlValue) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_cross_variant_numeric_hash() {
        assert_eq!(hash_of(&SqlValue::Integer(3)), hash_of(&SqlValue::Double(3.0)));
    }

    #[test]
    fn test_nan_hashes_consistently() {
        assert_eq!(
            hash_of(&SqlValue::Double(f64::NAN)),
            hash_of(&SqlValue::Double(-f64::NAN))
        );
    }
}
