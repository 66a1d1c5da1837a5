//! Aggregate accumulators
//!
//! One [`AggregateState`] lives in a slot of the current group's state
//! vector. The per-input-row id guards against double accumulation when
//! the same aggregate expression is touched more than once for one row.

use std::collections::HashSet;

use opalsql_types::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    CountAll,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateKind::CountAll | AggregateKind::Count => "COUNT",
            AggregateKind::Sum => "SUM",
            AggregateKind::Avg => "AVG",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
        }
    }

    /// Result when no row was ever accumulated for this aggregate.
    pub fn empty_value(&self) -> SqlValue {
        match self {
            AggregateKind::CountAll | AggregateKind::Count => SqlValue::Integer(0),
            _ => SqlValue::Null,
        }
    }
}

/// Accumulator for aggregate functions
#[derive(Debug, Clone)]
enum Accumulator {
    Count { count: i64 },
    Sum { sum: SqlValue, count: i64 },
    Avg { sum: SqlValue, count: i64 },
    Min { value: Option<SqlValue> },
    Max { value: Option<SqlValue> },
}

#[derive(Debug, Clone)]
pub struct AggregateState {
    accumulator: Accumulator,
    /// DISTINCT tracking; None when the aggregate is not DISTINCT.
    seen: Option<HashSet<SqlValue>>,
    pub last_row_id: u64,
}

impl AggregateState {
    pub fn new(kind: AggregateKind, distinct: bool) -> Self {
        let accumulator = match kind {
            AggregateKind::CountAll | AggregateKind::Count => Accumulator::Count { count: 0 },
            AggregateKind::Sum => Accumulator::Sum { sum: SqlValue::Integer(0), count: 0 },
            AggregateKind::Avg => Accumulator::Avg { sum: SqlValue::Integer(0), count: 0 },
            AggregateKind::Min => Accumulator::Min { value: None },
            AggregateKind::Max => Accumulator::Max { value: None },
        };
        let seen = if distinct { Some(HashSet::new()) } else { None };
        AggregateState { accumulator, seen, last_row_id: 0 }
    }

    /// Fold one input value in. `None` is the COUNT(*) case: every row
    /// counts, there is no argument value.
    pub fn accumulate(&mut self, value: Option<&SqlValue>) {
        let value = match value {
            None => {
                if let Accumulator::Count { count } = &mut self.accumulator {
                    *count += 1;
                }
                return;
            }
            Some(v) => v,
        };
        if value.is_null() {
            return;
        }
        if let Some(seen) = &mut self.seen {
            if seen.contains(value) {
                return;
            }
            seen.insert(value.clone());
        }
        match &mut self.accumulator {
            Accumulator::Count { count } => *count += 1,
            Accumulator::Sum { sum, count } | Accumulator::Avg { sum, count } => {
                if value.is_numeric() {
                    *sum = add_sql_values(sum, value);
                    *count += 1;
                }
            }
            Accumulator::Min { value: current } => {
                let better = match current {
                    Some(c) => value.cmp(c) == std::cmp::Ordering::Less,
                    None => true,
                };
                if better {
                    *current = Some(value.clone());
                }
            }
            Accumulator::Max { value: current } => {
                let better = match current {
                    Some(c) => value.cmp(c) == std::cmp::Ordering::Greater,
                    None => true,
                };
                if better {
                    *current = Some(value.clone());
                }
            }
        }
    }

    pub fn finalize(&self) -> SqlValue {
        match &self.accumulator {
            Accumulator::Count { count } => SqlValue::Integer(*count),
            Accumulator::Sum { sum, count } => {
                if *count == 0 {
                    SqlValue::Null
                } else {
                    sum.clone()
                }
            }
            Accumulator::Avg { sum, count } => {
                if *count == 0 {
                    SqlValue::Null
                } else {
                    divide_sql_value(sum, *count)
                }
            }
            Accumulator::Min { value } | Accumulator::Max { value } => {
                value.clone().unwrap_or(SqlValue::Null)
            }
        }
    }
}

/// Add two numeric values, promoting to Double on mixed input.
fn add_sql_values(a: &SqlValue, b: &SqlValue) -> SqlValue {
    match (a, b) {
        (SqlValue::Integer(x), SqlValue::Integer(y)) => SqlValue::Integer(x.wrapping_add(*y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => SqlValue::Double(x + y),
            _ => a.clone(),
        },
    }
}

/// Divide an accumulated sum by a row count, keeping integer division
/// for integer sums.
fn divide_sql_value(value: &SqlValue, count: i64) -> SqlValue {
    match value {
        SqlValue::Integer(sum) => SqlValue::Integer(sum / count),
        SqlValue::Double(sum) => SqlValue::Double(sum / count as f64),
        _ => SqlValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_all_counts_every_row() {
        let mut state = AggregateState::new(AggregateKind::CountAll, false);
        state.accumulate(None);
        state.accumulate(None);
        assert_eq!(state.finalize(), SqlValue::Integer(2));
    }

    #[test]
    fn test_count_skips_null() {
        let mut state = AggregateState::new(AggregateKind::Count, false);
        state.accumulate(Some(&SqlValue::Integer(1)));
        state.accumulate(Some(&SqlValue::Null));
        assert_eq!(state.finalize(), SqlValue::Integer(1));
    }

    #[test]
    fn test_sum_distinct() {
        let mut state = AggregateState::new(AggregateKind::Sum, true);
        for v in [10, 20, 10] {
            state.accumulate(Some(&SqlValue::Integer(v)));
        }
        assert_eq!(state.finalize(), SqlValue::Integer(30));
    }

    #[test]
    fn test_sum_of_nothing_is_null() {
        let state = AggregateState::new(AggregateKind::Sum, false);
        assert_eq!(state.finalize(), SqlValue::Null);
    }

    #[test]
    fn test_avg_integer_division() {
        let mut state = AggregateState::new(AggregateKind::Avg, false);
        state.accumulate(Some(&SqlValue::Integer(3)));
        state.accumulate(Some(&SqlValue::Integer(4)));
        assert_eq!(state.finalize(), SqlValue::Integer(3));
    }

    #[test]
    fn test_min_max() {
        let mut min = AggregateState::new(AggregateKind::Min, false);
        let mut max = AggregateState::new(AggregateKind::Max, false);
        for v in [3, 1, 2] {
            min.accumulate(Some(&SqlValue::Integer(v)));
            max.accumulate(Some(&SqlValue::Integer(v)));
        }
        assert_eq!(min.finalize(), SqlValue::Integer(1));
        assert_eq!(max.finalize(), SqlValue::Integer(3));
    }
}
