//! Per-execution state
//!
//! Everything a single execution mutates travels in an explicit
//! [`QueryContext`] so the prepared [`Select`](crate::Select) stays
//! immutable and reusable across executions, and lazy results can carry
//! their own scan state.

use opalsql_storage::{Database, Row};

use crate::expression::Expression;
use crate::select::groups::QueryGroups;
use crate::session::Session;

pub struct QueryContext<'a> {
    pub session: &'a Session<'a>,
    /// Current row per table filter, indexed by filter ordinal. An entry
    /// holding a NULL-padded row marks the null-extended side of an outer
    /// join.
    rows: Vec<Option<Row>>,
    /// Group-state store, present only while a grouping strategy runs.
    pub groups: Option<QueryGroups>,
    /// The prepared projection list; select-list column references made
    /// by HAVING resolve through it.
    pub select_expressions: &'a [Expression],
    /// Set while a quick-aggregate plan runs: aggregates answer from this
    /// table's metadata instead of group state.
    pub direct_lookup_table: Option<&'a str>,
}

impl<'a> QueryContext<'a> {
    pub fn new(
        session: &'a Session<'a>,
        filter_count: usize,
        select_expressions: &'a [Expression],
    ) -> Self {
        QueryContext {
            session,
            rows: vec![None; filter_count],
            groups: None,
            select_expressions,
            direct_lookup_table: None,
        }
    }

    /// A context with no filters, for optimize-time constant folding.
    pub fn constant(session: &'a Session<'a>) -> Self {
        QueryContext::new(session, 0, &[])
    }

    pub fn database(&self) -> &'a Database {
        self.session.database()
    }

    pub fn set_filter_row(&mut self, filter: usize, row: Option<Row>) {
        self.rows[filter] = row;
    }

    pub fn filter_row(&self, filter: usize) -> Option<&Row> {
        self.rows.get(filter).and_then(|r| r.as_ref())
    }

    pub fn clear_rows(&mut self) {
        for row in &mut self.rows {
            *row = None;
        }
    }
}
