//! The SELECT statement core
//!
//! For each select statement,
//! `visible_column_count <= distinct_column_count <= expressions.len()`.
//! The expression list can include ORDER BY, HAVING and GROUP BY
//! expressions that are not in the select list.
//!
//! The call sequence is `init()`, then `prepare()`, then any number of
//! `query_without_cache()` executions.

pub mod execute;
pub mod groups;
pub mod init;
pub mod lazy;
pub mod plan;
pub mod prepare;

use std::collections::HashSet;

use opalsql_storage::Database;
use opalsql_types::SqlValue;

use crate::context::QueryContext;
use crate::errors::ExecutorError;
use crate::expression::{ComparisonOp, Expression, ExpressionVisitor};
use crate::result::LocalResult;
use crate::session::Session;
use crate::sort::SortOrder;
use crate::table_filter::TableFilter;

/// One ORDER BY element as written, before binding folds it into the
/// expression list.
#[derive(Debug, Clone)]
pub struct SelectOrderBy {
    pub expression: Expression,
    /// Position in `expressions`, filled in by binding.
    pub column_index: Option<usize>,
    pub descending: bool,
    /// Explicit NULLS FIRST/LAST, or None for the direction default.
    pub nulls_last: Option<bool>,
}

impl SelectOrderBy {
    pub fn new(expression: Expression) -> Self {
        SelectOrderBy { expression, column_index: None, descending: false, nulls_last: None }
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls_last = Some(false);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls_last = Some(true);
        self
    }
}

pub struct Select {
    pub(crate) expressions: Vec<Expression>,
    pub(crate) visible_column_count: usize,
    pub(crate) distinct_column_count: usize,
    pub(crate) filters: Vec<TableFilter>,
    pub(crate) top_filters: Vec<usize>,
    pub(crate) top_table_filter: Option<usize>,
    pub(crate) condition: Option<Expression>,
    pub(crate) having: Option<Expression>,
    pub(crate) group: Option<Vec<Expression>>,
    /// Positions of the GROUP BY columns in `expressions`.
    pub(crate) group_index: Option<Vec<usize>>,
    /// Whether a column in the expression list is part of the group key.
    pub(crate) group_by_expression: Option<Vec<bool>>,
    pub(crate) having_index: Option<usize>,
    pub(crate) distinct: bool,
    pub(crate) distinct_expressions: Option<Vec<Expression>>,
    pub(crate) distinct_indexes: Option<Vec<usize>>,
    pub(crate) order_list: Option<Vec<SelectOrderBy>>,
    pub(crate) sort: Option<SortOrder>,
    pub(crate) limit_expr: Option<Expression>,
    pub(crate) offset_expr: Option<Expression>,
    pub(crate) fetch_percent: bool,
    pub(crate) with_ties: bool,
    pub(crate) sample_size_expr: Option<Expression>,
    pub(crate) is_group_query: bool,
    pub(crate) is_group_sorted_query: bool,
    pub(crate) is_distinct_query: bool,
    pub(crate) is_quick_aggregate_query: bool,
    pub(crate) is_for_update: bool,
    pub(crate) is_for_update_mvcc: bool,
    pub(crate) sort_using_index: bool,
    pub(crate) random_access_result: bool,
    pub(crate) cost: f64,
    pub(crate) is_prepared: bool,
    pub(crate) check_init: bool,
    pub(crate) column_names: Vec<String>,
    pub(crate) aggregate_count: usize,
}

impl Default for Select {
    fn default() -> Self {
        Select::new()
    }
}

impl Select {
    pub fn new() -> Self {
        Select {
            expressions: Vec::new(),
            visible_column_count: 0,
            distinct_column_count: 0,
            filters: Vec::new(),
            top_filters: Vec::new(),
            top_table_filter: None,
            condition: None,
            having: None,
            group: None,
            group_index: None,
            group_by_expression: None,
            having_index: None,
            distinct: false,
            distinct_expressions: None,
            distinct_indexes: None,
            order_list: None,
            sort: None,
            limit_expr: None,
            offset_expr: None,
            fetch_percent: false,
            with_ties: false,
            sample_size_expr: None,
            is_group_query: false,
            is_group_sorted_query: false,
            is_distinct_query: false,
            is_quick_aggregate_query: false,
            is_for_update: false,
            is_for_update_mvcc: false,
            sort_using_index: false,
            random_access_result: false,
            cost: 0.0,
            is_prepared: false,
            check_init: false,
            column_names: Vec::new(),
            aggregate_count: 0,
        }
    }

    /// Add a table to the query.
    ///
    /// `is_top` marks filters eligible as the root of the join plan.
    pub fn add_table_filter(&mut self, mut filter: TableFilter, is_top: bool) -> usize {
        let ordinal = self.filters.len();
        filter.ordinal = ordinal;
        self.filters.push(filter);
        if is_top {
            self.top_filters.push(ordinal);
        }
        ordinal
    }

    pub fn set_expressions(&mut self, expressions: Vec<Expression>) {
        self.expressions = expressions;
    }

    pub fn set_wildcard(&mut self) {
        self.expressions = vec![Expression::wildcard()];
    }

    /// Called if this query contains aggregate functions.
    pub fn set_group_query(&mut self) {
        self.is_group_query = true;
    }

    pub fn set_group_by(&mut self, group: Vec<Expression>) {
        self.group = Some(group);
        self.is_group_query = true;
    }

    pub fn set_having(&mut self, having: Expression) {
        self.having = Some(having);
        self.is_group_query = true;
    }

    pub fn set_distinct(&mut self) -> Result<(), ExecutorError> {
        if self.distinct_expressions.is_some() {
            return Err(ExecutorError::UnsupportedFeature(
                "DISTINCT ON together with DISTINCT".to_string(),
            ));
        }
        self.distinct = true;
        Ok(())
    }

    pub fn set_distinct_on(&mut self, expressions: Vec<Expression>) -> Result<(), ExecutorError> {
        if self.distinct {
            return Err(ExecutorError::UnsupportedFeature(
                "DISTINCT ON together with DISTINCT".to_string(),
            ));
        }
        self.distinct_expressions = Some(expressions);
        Ok(())
    }

    /// Opportunistic DISTINCT requested by an outer rewrite. Refused when
    /// OFFSET or LIMIT is present.
    pub fn set_distinct_if_possible(&mut self) {
        if !self.is_any_distinct() && self.offset_expr.is_none() && self.limit_expr.is_none() {
            self.distinct = true;
        }
    }

    pub fn is_any_distinct(&self) -> bool {
        self.distinct || self.distinct_expressions.is_some()
    }

    /// AND a condition onto the WHERE clause.
    pub fn add_condition(&mut self, condition: Expression) {
        self.condition = match self.condition.take() {
            None => Some(condition),
            Some(existing) => Some(Expression::and(condition, existing)),
        };
    }

    pub fn set_order_by(&mut self, order: Vec<SelectOrderBy>) {
        self.order_list = Some(order);
    }

    pub fn set_limit(&mut self, limit: Expression) {
        self.limit_expr = Some(limit);
    }

    pub fn set_offset(&mut self, offset: Expression) {
        self.offset_expr = Some(offset);
    }

    pub fn set_fetch_percent(&mut self, fetch_percent: bool) {
        self.fetch_percent = fetch_percent;
    }

    pub fn set_with_ties(&mut self, with_ties: bool) {
        self.with_ties = with_ties;
    }

    pub fn set_sample_size(&mut self, sample_size: Expression) {
        self.sample_size_expr = Some(sample_size);
    }

    pub fn set_for_update(&mut self, for_update: bool, database: &Database) {
        self.is_for_update = for_update;
        if database.settings.select_for_update_mvcc && database.settings.mv_store {
            self.is_for_update_mvcc = for_update;
        }
    }

    pub fn set_random_access_result(&mut self, random_access: bool) {
        self.random_access_result = random_access;
    }

    pub fn get_column_count(&self) -> usize {
        self.visible_column_count
    }

    pub fn get_cost(&self) -> f64 {
        self.cost
    }

    pub fn get_sort_order(&self) -> Option<&SortOrder> {
        self.sort.as_ref()
    }

    pub fn is_quick_aggregate_query(&self) -> bool {
        self.is_quick_aggregate_query
    }

    pub fn is_cacheable(&self) -> bool {
        !self.is_for_update
    }

    pub fn allow_global_conditions(&self) -> bool {
        self.offset_expr.is_none() && (self.limit_expr.is_none() || self.sort.is_none())
    }

    pub fn get_tables(&self) -> HashSet<String> {
        self.filters.iter().map(|f| f.table_name.clone()).collect()
    }

    pub fn fire_before_select_triggers(&self, database: &Database) -> Result<(), ExecutorError> {
        for filter in &self.filters {
            filter.table(database)?.fire_before_select();
        }
        Ok(())
    }

    /// An empty result carrying the prepared column layout.
    pub fn query_meta(&self) -> Result<LocalResult, ExecutorError> {
        if !self.is_prepared {
            return Err(ExecutorError::Internal("not prepared".to_string()));
        }
        let mut result = LocalResult::new(self.column_names.clone(), self.visible_column_count);
        result.done();
        Ok(result)
    }

    /// Bind column references in all expressions and the condition, for
    /// use of this select as a subquery.
    pub fn map_columns(
        &mut self,
        resolver: &dyn crate::expression::ColumnResolver,
        database: &Database,
        level: u32,
    ) -> Result<(), ExecutorError> {
        for expression in &mut self.expressions {
            expression.map_columns(resolver, database, level)?;
        }
        if let Some(condition) = &mut self.condition {
            condition.map_columns(resolver, database, level)?;
        }
        Ok(())
    }

    pub fn set_evaluatable(&mut self, filter: usize, evaluatable: bool) {
        for expression in &mut self.expressions {
            expression.set_evaluatable(filter, evaluatable);
        }
        if let Some(condition) = &mut self.condition {
            condition.set_evaluatable(filter, evaluatable);
        }
    }

    /// Fold the current row into every aggregate of this statement, for
    /// use of this select as a subquery inside an outer grouping.
    pub fn update_aggregate(&self, ctx: &mut QueryContext<'_>) -> Result<(), ExecutorError> {
        for expression in &self.expressions {
            expression.update_aggregate(ctx)?;
        }
        if let Some(condition) = &self.condition {
            condition.update_aggregate(ctx)?;
        }
        if let Some(having) = &self.having {
            having.update_aggregate(ctx)?;
        }
        Ok(())
    }

    pub fn is_everything(&self, visitor: &mut ExpressionVisitor<'_>) -> bool {
        if matches!(visitor, ExpressionVisitor::Deterministic) && self.is_for_update {
            return false;
        }
        for expression in &self.expressions {
            if !expression.is_everything(visitor) {
                return false;
            }
        }
        if let Some(condition) = &self.condition {
            if !condition.is_everything(visitor) {
                return false;
            }
        }
        if let Some(having) = &self.having {
            if !having.is_everything(visitor) {
                return false;
            }
        }
        true
    }

    pub fn is_read_only(&self) -> bool {
        self.is_everything(&mut ExpressionVisitor::ReadOnly)
    }

    /// Splice a parameterized predicate on one projection column. Joins
    /// the WHERE clause, or the HAVING clause when the column is not a
    /// group key of a group query. A non-comparable column still binds
    /// the parameter through a tautological null-safe self-equality.
    pub fn add_global_condition(
        &mut self,
        session: &Session<'_>,
        param_index: usize,
        column_id: usize,
        op: ComparisonOp,
    ) -> Result<(), ExecutorError> {
        let column = self.expressions[column_id].non_alias().clone();
        let param = Expression::parameter(param_index);
        let comparison = if column.is_everything(&mut ExpressionVisitor::QueryComparable) {
            Expression::comparison(op, column, param)
        } else {
            Expression::comparison(ComparisonOp::EqualNullSafe, param.clone(), param)
        };
        let comparison = comparison.optimize(session)?;
        let mut add_to_condition = true;
        if self.is_group_query {
            add_to_condition = self
                .group_index
                .as_ref()
                .map_or(false, |indexes| indexes.contains(&column_id));
            if !add_to_condition {
                // reconstruct HAVING from the expression list once; a
                // second injection must extend the reconstruction, not
                // re-register it
                if self.having.is_none() {
                    if let Some(having_index) = self.having_index {
                        self.having = Some(self.expressions[having_index].clone());
                    }
                }
                self.having = Some(match self.having.take() {
                    None => comparison.clone(),
                    Some(having) => Expression::and(having, comparison.clone()),
                });
            }
        }
        if add_to_condition {
            self.add_condition(comparison);
        }
        Ok(())
    }

    // ---- shared execution helpers ----

    pub(crate) fn is_condition_met(&self, ctx: &QueryContext<'_>) -> Result<bool, ExecutorError> {
        match &self.condition {
            None => Ok(true),
            Some(condition) => condition.boolean_value(ctx),
        }
    }

    pub(crate) fn is_having_null_or_false(&self, row: &[SqlValue]) -> bool {
        match self.having_index {
            Some(index) => !row[index].as_bool().unwrap_or(false),
            None => false,
        }
    }

    /// Remove appended columns so DISTINCT filtering sees only the
    /// distinct scope.
    pub(crate) fn keep_only_distinct(&self, mut row: Vec<SqlValue>) -> Vec<SqlValue> {
        if row.len() != self.distinct_column_count {
            row.truncate(self.distinct_column_count);
        }
        row
    }

    /// The composite group key of the current input row; the empty array
    /// when there is no GROUP BY.
    pub(crate) fn group_key(&self, ctx: &QueryContext<'_>) -> Result<SqlValue, ExecutorError> {
        match &self.group_index {
            None => Ok(SqlValue::Array(Vec::new())),
            Some(indexes) => {
                let mut keys = Vec::with_capacity(indexes.len());
                for &index in indexes {
                    keys.push(self.expressions[index].evaluate(ctx)?);
                }
                Ok(SqlValue::Array(keys))
            }
        }
    }

    /// Create a row with the current values, for queries with group-sort.
    /// Returns None when HAVING rejects the group.
    pub(crate) fn create_group_sorted_row(
        &self,
        key_values: &[SqlValue],
        ctx: &QueryContext<'_>,
    ) -> Result<Option<Vec<SqlValue>>, ExecutorError> {
        let column_count = self.expressions.len();
        let mut row = vec![SqlValue::Null; column_count];
        if let Some(group_index) = &self.group_index {
            for (j, &index) in group_index.iter().enumerate() {
                row[index] = key_values[j].clone();
            }
        }
        for (j, value) in row.iter_mut().enumerate() {
            if self.group_by_expression.as_ref().map_or(false, |mask| mask[j]) {
                continue;
            }
            *value = self.expressions[j].evaluate(ctx)?;
        }
        if self.is_having_null_or_false(&row) {
            return Ok(None);
        }
        Ok(Some(self.keep_only_distinct(row)))
    }

    pub(crate) fn group_by_expression_count(&self) -> usize {
        match &self.group_by_expression {
            None => 0,
            Some(mask) => mask.iter().filter(|&&b| b).count(),
        }
    }

    /// Evaluated sample size, 0 meaning unlimited.
    pub(crate) fn sample_size(&self, ctx: &QueryContext<'_>) -> Result<u64, ExecutorError> {
        match &self.sample_size_expr {
            None => Ok(0),
            Some(expr) => {
                let value = expr.evaluate(ctx)?;
                Ok(value.as_i64().filter(|&v| v > 0).unwrap_or(0) as u64)
            }
        }
    }
}
