//! Result sinks and the materialized result
//!
//! The executor streams rows into a [`ResultTarget`]. [`LocalResult`] is
//! the buffered sink: `done()` runs the deferred pipeline (distinct,
//! sort, fetch-percent conversion, offset, limit, tie extension) and then
//! the result acts as a rewindable cursor over visible-width rows.

use indexmap::IndexSet;

use opalsql_types::SqlValue;

use crate::errors::ExecutorError;
use crate::select::lazy::LazyResult;
use crate::sort::SortOrder;

/// Anything rows can be pushed into.
pub trait ResultTarget {
    fn add_row(&mut self, row: Vec<SqlValue>) -> Result<(), ExecutorError>;

    fn row_count(&self) -> usize;

    /// Called when the producer already enforced limit and tie semantics,
    /// so the sink must not apply them again.
    fn limits_were_applied(&mut self) {}
}

/// The outcome of executing a SELECT: a buffered result, or a lazy one
/// the caller drives row by row. Nothing is returned when the rows were
/// drained into a caller-provided target.
pub enum QueryResult<'a> {
    Materialized(LocalResult),
    Lazy(LazyResult<'a>),
}

impl std::fmt::Debug for QueryResult<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryResult::Materialized(result) => f.debug_tuple("Materialized").field(result).finish(),
            QueryResult::Lazy(_) => f.debug_tuple("Lazy").finish(),
        }
    }
}

impl QueryResult<'_> {
    pub fn visible_column_count(&self) -> usize {
        match self {
            QueryResult::Materialized(result) => result.visible_column_count(),
            QueryResult::Lazy(result) => result.visible_column_count(),
        }
    }

    /// Drain into a fully materialized row list, consuming the result.
    pub fn into_rows(self) -> Result<Vec<Vec<SqlValue>>, ExecutorError> {
        match self {
            QueryResult::Materialized(mut result) => {
                let mut rows = Vec::with_capacity(result.row_count());
                result.reset();
                while result.next() {
                    rows.push(result.current_row().to_vec());
                }
                result.close();
                Ok(rows)
            }
            QueryResult::Lazy(mut result) => {
                let mut rows = Vec::new();
                while result.next()? {
                    rows.push(result.current_row().to_vec());
                }
                result.close();
                Ok(rows)
            }
        }
    }
}

#[derive(Debug)]
pub struct LocalResult {
    column_names: Vec<String>,
    visible_column_count: usize,
    rows: Vec<Vec<SqlValue>>,
    sort: Option<SortOrder>,
    distinct: bool,
    distinct_indexes: Option<Vec<usize>>,
    offset: usize,
    limit: Option<usize>,
    fetch_percent: bool,
    with_ties: bool,
    limits_applied: bool,
    done: bool,
    pos: Option<usize>,
    closed: bool,
}

impl LocalResult {
    pub fn new(column_names: Vec<String>, visible_column_count: usize) -> Self {
        LocalResult {
            column_names,
            visible_column_count,
            rows: Vec::new(),
            sort: None,
            distinct: false,
            distinct_indexes: None,
            offset: 0,
            limit: None,
            fetch_percent: false,
            with_ties: false,
            limits_applied: false,
            done: false,
            pos: None,
            closed: false,
        }
    }

    pub fn set_sort_order(&mut self, sort: SortOrder) {
        self.sort = Some(sort);
    }

    pub fn set_distinct(&mut self) {
        self.distinct = true;
    }

    /// DISTINCT ON: deduplicate on these expression positions only.
    pub fn set_distinct_on(&mut self, indexes: Vec<usize>) {
        self.distinct_indexes = Some(indexes);
    }

    pub fn is_any_distinct(&self) -> bool {
        self.distinct || self.distinct_indexes.is_some()
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Negative means unlimited.
    pub fn set_limit(&mut self, limit: i64) {
        self.limit = if limit < 0 { None } else { Some(limit as usize) };
    }

    pub fn set_fetch_percent(&mut self, fetch_percent: bool) {
        self.fetch_percent = fetch_percent;
    }

    pub fn set_with_ties(&mut self, with_ties: bool) {
        self.with_ties = with_ties;
    }

    /// Finish collection: apply the deferred pipeline and rewind.
    pub fn done(&mut self) {
        if self.done {
            return;
        }
        if self.is_any_distinct() {
            let distinct_indexes = self.distinct_indexes.clone();
            let visible = self.visible_column_count;
            let mut seen: IndexSet<Vec<SqlValue>> = IndexSet::new();
            self.rows.retain(|row| {
                let key: Vec<SqlValue> = match &distinct_indexes {
                    Some(indexes) => indexes.iter().map(|&i| row[i].clone()).collect(),
                    None => row.iter().take(visible).cloned().collect(),
                };
                seen.insert(key)
            });
        }
        if let Some(sort) = &self.sort {
            sort.sort(&mut self.rows);
        }
        if !self.limits_applied {
            let mut limit = self.limit;
            if self.fetch_percent {
                if let Some(percent) = limit {
                    limit = Some((self.rows.len() * percent + 99) / 100);
                }
            }
            if self.offset > 0 {
                let drop = self.offset.min(self.rows.len());
                self.rows.drain(..drop);
            }
            if let Some(limit) = limit {
                if self.rows.len() > limit {
                    let keep = if self.with_ties && self.sort.is_some() && limit > 0 {
                        let sort = self.sort.as_ref().expect("checked above");
                        let boundary = self.rows[limit - 1].clone();
                        let mut end = limit;
                        while end < self.rows.len()
                            && sort.compare(&self.rows[end], &boundary) == std::cmp::Ordering::Equal
                        {
                            end += 1;
                        }
                        end
                    } else {
                        limit
                    };
                    self.rows.truncate(keep);
                }
            }
        }
        for row in &mut self.rows {
            row.truncate(self.visible_column_count);
        }
        self.done = true;
        self.pos = None;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn visible_column_count(&self) -> usize {
        self.visible_column_count
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn next(&mut self) -> bool {
        let next = match self.pos {
            None => 0,
            Some(p) => p + 1,
        };
        if next < self.rows.len() {
            self.pos = Some(next);
            true
        } else {
            self.pos = Some(self.rows.len());
            false
        }
    }

    pub fn current_row(&self) -> &[SqlValue] {
        let pos = self.pos.expect("next() not called");
        &self.rows[pos]
    }

    pub fn reset(&mut self) {
        self.pos = None;
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.rows.clear();
    }
}

impl ResultTarget for LocalResult {
    fn add_row(&mut self, row: Vec<SqlValue>) -> Result<(), ExecutorError> {
        self.rows.push(row);
        Ok(())
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn limits_were_applied(&mut self) {
        self.limits_applied = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::{SortOrder, SortSpec};

    fn int_row(values: &[i64]) -> Vec<SqlValue> {
        values.iter().map(|&v| SqlValue::Integer(v)).collect()
    }

    fn filled() -> LocalResult {
        let mut result = LocalResult::new(vec!["a".into()], 1);
        for v in [3, 1, 2, 1] {
            result.add_row(int_row(&[v])).unwrap();
        }
        result
    }

    #[test]
    fn test_done_applies_sort_offset_limit() {
        let mut result = filled();
        result.set_sort_order(SortOrder::new(vec![0], vec![SortSpec::ascending()]));
        result.set_offset(1);
        result.set_limit(2);
        result.done();
        let mut rows = Vec::new();
        while result.next() {
            rows.push(result.current_row().to_vec());
        }
        assert_eq!(rows, vec![int_row(&[1]), int_row(&[2])]);
    }

    #[test]
    fn test_distinct_keeps_first() {
        let mut result = filled();
        result.set_distinct();
        result.done();
        assert_eq!(result.row_count(), 3);
    }

    #[test]
    fn test_with_ties_extends_past_limit() {
        let mut result = LocalResult::new(vec!["a".into()], 1);
        for v in [10, 20, 20, 30] {
            result.add_row(int_row(&[v])).unwrap();
        }
        result.set_sort_order(SortOrder::new(vec![0], vec![SortSpec::ascending()]));
        result.set_limit(2);
        result.set_with_ties(true);
        result.done();
        assert_eq!(result.row_count(), 3);
    }

    #[test]
    fn test_fetch_percent_rounds_up() {
        let mut result = LocalResult::new(vec!["a".into()], 1);
        for v in 0..5 {
            result.add_row(int_row(&[v])).unwrap();
        }
        result.set_limit(30); // 30 percent of 5 rows -> 2
        result.set_fetch_percent(true);
        result.done();
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn test_done_is_idempotent() {
        let mut result = filled();
        result.set_limit(2);
        result.done();
        result.done();
        assert_eq!(result.row_count(), 2);
    }
}
