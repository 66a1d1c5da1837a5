//! Binding: wildcard expansion and DISTINCT ON / ORDER BY / HAVING /
//! GROUP BY resolution
//!
//! Binding appends to the expression list: first the select list
//! (visible columns), then ORDER BY expressions, then HAVING, and GROUP
//! BY expressions at the end. Matching is by identifier-aware SQL text,
//! falling back to alias names.

use std::collections::BTreeSet;

use opalsql_storage::Database;
use opalsql_types::{DataType, SqlValue};

use crate::errors::ExecutorError;
use crate::expression::{
    ColumnRef, Expression, ResolvedColumn, SelectListColumnResolver,
};
use crate::select::{Select, SelectOrderBy};
use crate::session::Session;

impl Select {
    /// Bind the statement. Must be called exactly once; a second call is
    /// an internal error.
    pub fn init(&mut self, session: &Session<'_>) -> Result<(), ExecutorError> {
        if self.check_init {
            return Err(ExecutorError::Internal("select already initialized".to_string()));
        }
        let database = session.database();
        self.expand_column_list(database)?;
        self.visible_column_count = self.expressions.len();

        // SQL text of the visible expressions' non-alias forms, for
        // match-by-text binding below
        let expression_sql: Option<Vec<String>> = if self.distinct_expressions.is_some()
            || self.order_list.is_some()
            || self.group.is_some()
        {
            Some(
                self.expressions
                    .iter()
                    .take(self.visible_column_count)
                    .map(|e| e.non_alias().sql_text())
                    .collect(),
            )
        } else {
            None
        };

        if let Some(distinct_expressions) = self.distinct_expressions.clone() {
            let sql = expression_sql.as_ref().expect("snapshot exists when DISTINCT ON is set");
            let mut indexes = BTreeSet::new();
            for expression in distinct_expressions {
                let index = init_expression(
                    database,
                    &mut self.expressions,
                    sql,
                    expression,
                    self.visible_column_count,
                    false,
                )?;
                indexes.insert(index);
            }
            self.distinct_indexes = Some(indexes.into_iter().collect());
        }

        if let Some(mut order_list) = self.order_list.take() {
            let sql = expression_sql.as_ref().expect("snapshot exists when ORDER BY is set");
            let must_be_in_result = self.is_any_distinct();
            for item in &mut order_list {
                init_order(
                    database,
                    &mut self.expressions,
                    sql,
                    item,
                    self.visible_column_count,
                    must_be_in_result,
                )?;
            }
            self.order_list = Some(order_list);
        }

        self.distinct_column_count = self.expressions.len();

        if let Some(having) = self.having.take() {
            self.expressions.push(having);
            self.having_index = Some(self.expressions.len() - 1);
        } else {
            self.having_index = None;
        }

        if self.with_ties && self.order_list.is_none() {
            return Err(ExecutorError::WithTiesWithoutOrderBy);
        }

        if let Some(group) = self.group.take() {
            let sql = expression_sql.as_ref().expect("snapshot exists when GROUP BY is set");
            let mut group_index = Vec::with_capacity(group.len());
            for expression in group {
                let group_sql = expression.sql_text();
                let mut found = sql
                    .iter()
                    .position(|s| database.equals_identifiers(s, &group_sql));
                if found.is_none() {
                    // special case: GROUP BY a column alias
                    let group_alias = expression.alias_or_derived_name();
                    found = self
                        .expressions
                        .iter()
                        .take(self.visible_column_count)
                        .position(|e| {
                            let alias = e.alias_or_derived_name();
                            database.equals_identifiers(&group_sql, &alias)
                                || database.equals_identifiers(&group_alias, &alias)
                        });
                }
                match found {
                    Some(index) => group_index.push(index),
                    None => {
                        group_index.push(self.expressions.len());
                        self.expressions.push(expression);
                    }
                }
            }
            let mut mask = vec![false; self.expressions.len()];
            for &index in &group_index {
                mask[index] = true;
            }
            self.group_index = Some(group_index);
            self.group_by_expression = Some(mask);
        }

        // the parser marks group queries as it reads aggregates; detect
        // them here as well so hand-built statements behave the same
        if self.expressions.iter().any(|e| e.contains_aggregate()) {
            self.is_group_query = true;
        }

        // map columns in the select list, condition and join conditions
        // over every filter
        let mut filters = std::mem::take(&mut self.filters);
        let mut join_conditions: Vec<Option<Expression>> =
            filters.iter_mut().map(|f| f.join_condition.take()).collect();
        for filter in &filters {
            for expression in &mut self.expressions {
                expression.map_columns(filter, database, 0)?;
            }
            if let Some(condition) = &mut self.condition {
                condition.map_columns(filter, database, 0)?;
            }
            for join_condition in join_conditions.iter_mut().flatten() {
                join_condition.map_columns(filter, database, 0)?;
            }
        }
        for (filter, join_condition) in filters.iter_mut().zip(join_conditions) {
            filter.join_condition = join_condition;
        }
        self.filters = filters;

        // HAVING may also reference select-list aliases and aggregates
        if let Some(having_index) = self.having_index {
            let mut having =
                std::mem::replace(&mut self.expressions[having_index], Expression::integer(0));
            {
                let resolver =
                    SelectListColumnResolver::new(&self.expressions, self.visible_column_count);
                having.map_columns(&resolver, database, 0)?;
            }
            self.expressions[having_index] = having;
        }

        // number aggregates: the ids key their group-state slots
        let mut next = 0;
        for expression in &mut self.expressions {
            expression.assign_aggregate_ids(&mut next);
        }
        if let Some(condition) = &mut self.condition {
            condition.assign_aggregate_ids(&mut next);
        }
        self.aggregate_count = next;

        self.check_init = true;
        Ok(())
    }

    /// Replace each wildcard with the visible columns of the matching
    /// filter(s), preserving order.
    fn expand_column_list(&mut self, database: &Database) -> Result<(), ExecutorError> {
        let mut i = 0;
        while i < self.expressions.len() {
            let table_alias = match &self.expressions[i] {
                Expression::Wildcard { table } => table.clone(),
                _ => {
                    i += 1;
                    continue;
                }
            };
            self.expressions.remove(i);
            match table_alias {
                None => {
                    let mut insert = i;
                    for filter_index in 0..self.filters.len() {
                        insert = self.expand_filter_columns(database, filter_index, insert)?;
                    }
                    i = insert;
                }
                Some(alias) => {
                    let filter_index = self
                        .filters
                        .iter()
                        .position(|f| database.equals_identifiers(&alias, &f.alias))
                        .ok_or(ExecutorError::TableNotFound(alias))?;
                    i = self.expand_filter_columns(database, filter_index, i)?;
                }
            }
        }
        Ok(())
    }

    fn expand_filter_columns(
        &mut self,
        database: &Database,
        filter_index: usize,
        mut insert: usize,
    ) -> Result<usize, ExecutorError> {
        let filter = &self.filters[filter_index];
        let alias = filter.alias.clone();
        let columns: Vec<(usize, String, DataType)> = filter
            .table(database)?
            .schema
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.visible)
            .map(|(i, c)| (i, c.name.clone(), c.data_type.clone()))
            .collect();
        for (column, name, data_type) in columns {
            let expression = Expression::Column(ColumnRef {
                table: Some(alias.clone()),
                name,
                resolved: Some(ResolvedColumn::FilterColumn { filter: filter_index, column }),
                data_type,
                evaluatable: false,
            });
            self.expressions.insert(insert, expression);
            insert += 1;
        }
        Ok(insert)
    }
}

/// Match an expression against the projection list (by SQL text, then by
/// alias), appending it when absent. Returns its position.
fn init_expression(
    database: &Database,
    expressions: &mut Vec<Expression>,
    expression_sql: &[String],
    expression: Expression,
    visible_column_count: usize,
    must_be_in_result: bool,
) -> Result<usize, ExecutorError> {
    let sql = expression.non_alias().sql_text();
    if let Some(index) = expression_sql
        .iter()
        .position(|s| database.equals_identifiers(s, &sql))
    {
        return Ok(index);
    }
    if let Expression::Column(col) = expression.non_alias() {
        if col.table.is_none() {
            for (index, e) in expressions.iter().enumerate().take(visible_column_count) {
                if database.equals_identifiers(&col.name, &e.alias_or_derived_name()) {
                    return Ok(index);
                }
            }
        }
    }
    if must_be_in_result {
        return Err(ExecutorError::InvalidValue {
            parameter: "ORDER BY".to_string(),
            value: sql,
        });
    }
    expressions.push(expression);
    Ok(expressions.len() - 1)
}

/// Bind one ORDER BY element. A positive integer literal is a 1-based
/// column position; anything else goes through match-or-append.
fn init_order(
    database: &Database,
    expressions: &mut Vec<Expression>,
    expression_sql: &[String],
    item: &mut SelectOrderBy,
    visible_column_count: usize,
    must_be_in_result: bool,
) -> Result<(), ExecutorError> {
    if let Expression::Literal(SqlValue::Integer(position)) = item.expression.non_alias() {
        let position = *position;
        if position < 1 || position as usize > visible_column_count {
            return Err(ExecutorError::InvalidValue {
                parameter: "ORDER BY".to_string(),
                value: position.to_string(),
            });
        }
        item.column_index = Some(position as usize - 1);
        return Ok(());
    }
    let index = init_expression(
        database,
        expressions,
        expression_sql,
        item.expression.clone(),
        visible_column_count,
        must_be_in_result,
    )?;
    item.column_index = Some(index);
    Ok(())
}
