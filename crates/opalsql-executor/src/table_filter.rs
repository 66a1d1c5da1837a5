//! Table filters: pull-based row sources over a table
//!
//! A filter is plan-time state only: the chosen access index, the index
//! conditions promoted from the WHERE clause, and the join linkage. All
//! scan state lives in the [`FilterChain`] so a prepared statement can
//! run concurrently-reentrant executions and lazy results can own their
//! own cursor positions.

use opalsql_storage::{Cursor, Database, Row, Table};
use opalsql_types::{DataType, SqlValue};

use crate::context::QueryContext;
use crate::errors::ExecutorError;
use crate::expression::{
    ColumnResolver, ComparisonOp, Expression, ResolvedColumn,
};
use crate::session::Session;

/// A predicate promoted from the WHERE clause into an index seek:
/// `column <op> expr`, with `expr` evaluatable without this filter.
#[derive(Debug, Clone)]
pub struct IndexCondition {
    pub column: usize,
    pub op: ComparisonOp,
    pub expr: Expression,
}

#[derive(Debug, Clone)]
pub struct TableFilter {
    pub table_name: String,
    pub alias: String,
    /// Position in the statement's filter list; column references resolve
    /// to this ordinal.
    pub ordinal: usize,
    /// Chosen access index (position in the table's index list), or None
    /// for the scan path.
    pub index: Option<usize>,
    pub index_conditions: Vec<IndexCondition>,
    /// Residual ON condition, checked per candidate row of this filter.
    pub join_condition: Option<Expression>,
    /// This filter is the null-extended side of a LEFT OUTER JOIN.
    pub joined_outer: bool,
    /// Next filter in the join chain, set by the join planner.
    pub join: Option<usize>,
    /// Whether IN-style multi-point lookups are installed; they can
    /// return keys out of index order, which vetoes sort elision.
    pub has_in_comparisons: bool,
}

impl TableFilter {
    pub fn new(table_name: &str, alias: &str) -> Self {
        TableFilter {
            table_name: table_name.to_string(),
            alias: alias.to_string(),
            ordinal: 0,
            index: None,
            index_conditions: Vec::new(),
            join_condition: None,
            joined_outer: false,
            join: None,
            has_in_comparisons: false,
        }
    }

    pub fn table<'a>(&self, database: &'a Database) -> Result<&'a Table, ExecutorError> {
        database
            .get_table(&self.table_name)
            .ok_or_else(|| ExecutorError::TableNotFound(self.table_name.clone()))
    }

    pub fn is_join_outer(&self) -> bool {
        self.joined_outer
    }

    pub fn set_index(&mut self, index: Option<usize>) {
        self.index = index;
    }

    /// True when the chosen access path is the full-table scan.
    pub fn index_is_scan(&self) -> bool {
        self.index.is_none()
    }

    /// Acquire the table lock this filter needs.
    pub fn lock(&self, session: &Session<'_>, exclusive: bool) -> Result<(), ExecutorError> {
        session.database().lock_table(session.id(), &self.table_name, exclusive)?;
        Ok(())
    }
}

impl ColumnResolver for TableFilter {
    fn resolve_column(
        &self,
        database: &Database,
        table: Option<&str>,
        name: &str,
    ) -> Option<(ResolvedColumn, DataType)> {
        if let Some(qualifier) = table {
            if !database.equals_identifiers(qualifier, &self.alias) {
                return None;
            }
        }
        let schema = &database.get_table(&self.table_name)?.schema;
        let column = schema
            .columns
            .iter()
            .position(|c| database.equals_identifiers(&c.name, name))?;
        Some((
            ResolvedColumn::FilterColumn { filter: self.ordinal, column },
            schema.columns[column].data_type.clone(),
        ))
    }
}

/// Whether every filter row the expression references is currently bound.
fn condition_ready(expr: &Expression, ctx: &QueryContext<'_>) -> bool {
    match expr {
        Expression::Column(col) => match col.resolved {
            Some(ResolvedColumn::FilterColumn { filter, .. }) => ctx.filter_row(filter).is_some(),
            _ => true,
        },
        Expression::Alias { inner, .. } => condition_ready(inner, ctx),
        Expression::Negate(inner) => condition_ready(inner, ctx),
        Expression::Comparison { left, right, .. }
        | Expression::AndOr { left, right, .. }
        | Expression::Arithmetic { left, right, .. } => {
            condition_ready(left, ctx) && condition_ready(right, ctx)
        }
        Expression::Aggregate(agg) => {
            agg.arg.as_ref().map_or(true, |a| condition_ready(a, ctx))
        }
        _ => true,
    }
}

#[derive(Debug, Default)]
struct FilterState {
    cursor: Option<Cursor>,
    current_row_id: Option<usize>,
    matched: bool,
    null_extended: bool,
}

impl FilterState {
    fn clear(&mut self) {
        self.cursor = None;
        self.current_row_id = None;
        self.matched = false;
        self.null_extended = false;
    }
}

/// Nested-loop driver over the join chain. `next` advances to the next
/// combined row, binding each filter's current row into the context.
pub struct FilterChain<'a> {
    filters: Vec<&'a TableFilter>,
    states: Vec<FilterState>,
    started: bool,
}

impl<'a> FilterChain<'a> {
    /// Build from the chain starting at `top` (filters linked by `join`).
    pub fn new(all_filters: &'a [TableFilter], top: usize) -> Self {
        let mut filters = Vec::new();
        let mut next = Some(top);
        while let Some(ordinal) = next {
            let filter = &all_filters[ordinal];
            filters.push(filter);
            next = filter.join;
        }
        let states = filters.iter().map(|_| FilterState::default()).collect();
        FilterChain { filters, states, started: false }
    }

    pub fn top(&self) -> &TableFilter {
        self.filters[0]
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Row id of the top filter's current row, for row locking.
    pub fn top_row_id(&self) -> Option<usize> {
        self.states[0].current_row_id
    }

    pub fn reset(&mut self, ctx: &mut QueryContext<'_>) {
        for state in &mut self.states {
            state.clear();
        }
        self.started = false;
        ctx.clear_rows();
    }

    /// Advance to the next combined row. Cancellation is honored here,
    /// between rows.
    pub fn next(&mut self, ctx: &mut QueryContext<'_>) -> Result<bool, ExecutorError> {
        ctx.session.check_canceled()?;
        let depth = self.filters.len();
        if depth == 0 {
            return Ok(false);
        }
        let mut level = if self.started {
            depth - 1
        } else {
            self.started = true;
            0
        };
        loop {
            if self.advance(level, ctx)? {
                if level + 1 == depth {
                    return Ok(true);
                }
                level += 1;
                self.states[level].clear();
            } else {
                if level == 0 {
                    return Ok(false);
                }
                self.states[level].clear();
                level -= 1;
            }
        }
    }

    /// Advance one filter to its next row that satisfies the join
    /// condition, null-extending once for an unmatched outer side.
    fn advance(&mut self, level: usize, ctx: &mut QueryContext<'_>) -> Result<bool, ExecutorError> {
        let filter = self.filters[level];
        loop {
            if self.states[level].cursor.is_none() {
                let cursor = open_cursor(filter, ctx)?;
                let state = &mut self.states[level];
                state.cursor = Some(cursor);
                state.matched = false;
                state.null_extended = false;
            }
            match self.states[level].cursor.as_mut().expect("cursor just opened").next() {
                Some(row_id) => {
                    let table = filter.table(ctx.database())?;
                    let row = table.row(row_id).cloned().ok_or_else(|| {
                        ExecutorError::Internal(format!("missing row {} in scan", row_id))
                    })?;
                    ctx.set_filter_row(filter.ordinal, Some(row));
                    self.states[level].current_row_id = Some(row_id);
                    if let Some(condition) = &filter.join_condition {
                        if !condition.boolean_value(ctx)? {
                            continue;
                        }
                    }
                    self.states[level].matched = true;
                    return Ok(true);
                }
                None => {
                    let state = &mut self.states[level];
                    if filter.joined_outer && !state.matched && !state.null_extended {
                        state.null_extended = true;
                        state.current_row_id = None;
                        let width = filter.table(ctx.database())?.schema.column_count();
                        ctx.set_filter_row(filter.ordinal, Some(Row::nulls(width)));
                        return Ok(true);
                    }
                    state.current_row_id = None;
                    ctx.set_filter_row(filter.ordinal, None);
                    return Ok(false);
                }
            }
        }
    }
}

/// Open the filter's cursor, seeding index bounds from the conditions
/// that are evaluatable against the already-bound outer rows.
fn open_cursor(filter: &TableFilter, ctx: &QueryContext<'_>) -> Result<Cursor, ExecutorError> {
    let table = filter.table(ctx.database())?;
    let index = match filter.index {
        None => return Ok(table.scan_cursor()),
        Some(position) => table
            .index(position)
            .ok_or_else(|| ExecutorError::Internal("chosen index disappeared".to_string()))?,
    };
    let positions = index.column_positions();
    let mut prefix: Vec<SqlValue> = Vec::new();
    for &pos in &positions {
        let condition = filter.index_conditions.iter().find(|c| {
            c.column == pos && c.op == ComparisonOp::Equal && condition_ready(&c.expr, ctx)
        });
        match condition {
            Some(c) => {
                let value = c.expr.evaluate(ctx)?;
                if value.is_null() {
                    // equality with NULL matches nothing
                    return Ok(Cursor::new(Vec::new()));
                }
                prefix.push(value);
            }
            None => break,
        }
    }
    let mut lower = prefix.clone();
    let mut upper = prefix.clone();
    let mut has_range = false;
    // range seeding only works in ascending key space; a descending
    // column still benefits from the equality prefix
    let range_ok = index.columns.get(prefix.len()).map_or(false, |c| !c.descending);
    if let (Some(&next_col), true) = (positions.get(prefix.len()), range_ok) {
        for condition in &filter.index_conditions {
            if condition.column != next_col || !condition_ready(&condition.expr, ctx) {
                continue;
            }
            match condition.op {
                ComparisonOp::Greater | ComparisonOp::GreaterEqual => {
                    if lower.len() == prefix.len() {
                        let value = condition.expr.evaluate(ctx)?;
                        if value.is_null() {
                            return Ok(Cursor::new(Vec::new()));
                        }
                        lower.push(value);
                        has_range = true;
                    }
                }
                ComparisonOp::Less | ComparisonOp::LessEqual => {
                    if upper.len() == prefix.len() {
                        let value = condition.expr.evaluate(ctx)?;
                        if value.is_null() {
                            return Ok(Cursor::new(Vec::new()));
                        }
                        upper.push(value);
                        has_range = true;
                    }
                }
                _ => {}
            }
        }
    }
    if prefix.is_empty() && !has_range {
        return Ok(index.cursor(None, None));
    }
    let lower_bound = if lower.is_empty() { None } else { Some(lower.as_slice()) };
    let upper_bound = if upper.is_empty() { None } else { Some(upper.as_slice()) };
    Ok(index.cursor(lower_bound, upper_bound))
}
