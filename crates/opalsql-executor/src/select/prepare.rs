//! Planning: physical access-path selection
//!
//! `prepare()` turns the bound statement into an executable plan: it
//! materializes the sort order, names output columns, optimizes
//! expressions, pushes index conditions, runs the join planner, and then
//! tries the access-path shortcuts (quick aggregate, single-column
//! distinct scan, index-backed ORDER BY, group-sorted aggregation).

use std::collections::HashSet;

use opalsql_catalog::SELECTIVITY_DEFAULT;
use opalsql_storage::Database;

use crate::errors::ExecutorError;
use crate::expression::{Expression, ExpressionVisitor, ResolvedColumn};
use crate::optimizer;
use crate::select::{Select, SelectOrderBy};
use crate::session::Session;
use crate::sort::{SortOrder, SortSpec};

/// Outcome of the ORDER BY index search.
enum SortIndexChoice {
    /// Sorting only on constants; any path works.
    Scan,
    /// Index at this position in the table's index list.
    Index(usize),
}

impl Select {
    /// Plan the statement. A second call is a no-op (subqueries are
    /// sometimes prepared twice); calling before `init` is an internal
    /// error.
    pub fn prepare(&mut self, session: &Session<'_>) -> Result<(), ExecutorError> {
        if self.is_prepared {
            return Ok(());
        }
        if !self.check_init {
            return Err(ExecutorError::Internal("select not initialized".to_string()));
        }
        let database = session.database();

        if let Some(order_list) = self.order_list.take() {
            self.sort = Some(prepare_order(&order_list));
        }

        // name output columns, wrapping in an alias when the allocator
        // changes the proposed name, then optimize each expression
        let mut used_names: HashSet<String> = HashSet::new();
        let mut names = Vec::with_capacity(self.expressions.len());
        for i in 0..self.expressions.len() {
            let expression = std::mem::replace(&mut self.expressions[i], Expression::integer(0));
            let proposed = expression.alias_or_derived_name();
            let mut column_name = proposed.clone();
            let mut n = 1;
            while !used_names.insert(column_name.clone()) {
                n += 1;
                column_name = format!("{}_{}", proposed, n);
            }
            let expression = if column_name != proposed {
                Expression::Alias {
                    name: column_name.clone(),
                    auto_generated: true,
                    inner: Box::new(expression),
                }
            } else {
                expression
            };
            names.push(column_name);
            self.expressions[i] = expression.optimize(session)?;
        }
        names.truncate(self.visible_column_count);
        self.column_names = names;

        if let Some(condition) = self.condition.take() {
            let condition = condition.optimize(session)?;
            for filter in &mut self.filters {
                // outer joins must not get conditions like "c IS NULL"
                // pushed into their index
                if !filter.is_join_outer() {
                    condition.create_index_conditions(filter.ordinal, &mut filter.index_conditions);
                }
            }
            self.condition = Some(condition);
        }

        if self.is_group_query
            && self.group_index.is_none()
            && self.having_index.is_none()
            && self.filters.len() == 1
            && self.condition.is_none()
        {
            let table = self.filters[0].table(database)?;
            let mut visitor = ExpressionVisitor::OptimizableAggregate { table };
            self.is_quick_aggregate_query =
                self.expressions.iter().all(|e| e.is_everything(&mut visitor));
            if self.is_quick_aggregate_query {
                log::debug!("direct lookup plan for {}", self.filters[0].table_name);
            }
        }

        self.cost = self.prepare_plan(database)?;

        self.prepare_distinct_query(database)?;

        if self.sort.is_some() && !self.is_quick_aggregate_query && !self.is_group_query {
            self.prepare_sort_index(database)?;
        }

        if !self.is_quick_aggregate_query
            && self.is_group_query
            && self.group_by_expression_count() > 0
        {
            if let Some(position) = self.group_sorted_index(database)? {
                let top = self.top_table_filter.expect("planned");
                let current = self.filters[top].index;
                if current.is_none() || current == Some(position) {
                    self.filters[top].set_index(Some(position));
                    self.is_group_sorted_query = true;
                    log::debug!("group sorted plan for {}", self.filters[top].table_name);
                }
            }
        }

        self.is_prepared = true;
        Ok(())
    }

    fn prepare_plan(&mut self, database: &Database) -> Result<f64, ExecutorError> {
        let (top, cost) =
            optimizer::plan_joins(&mut self.filters, &self.top_filters, database)?;
        self.top_table_filter = Some(top);
        self.set_evaluatable_recursive(top)?;
        Ok(cost)
    }

    /// Walk the join chain in order, marking each filter's columns
    /// evaluatable, and lift join conditions that cannot be evaluated at
    /// their point in the order into the main WHERE (non-outer only).
    fn set_evaluatable_recursive(&mut self, top: usize) -> Result<(), ExecutorError> {
        let mut next = Some(top);
        while let Some(ordinal) = next {
            if let Some(condition) = &mut self.condition {
                condition.set_evaluatable(ordinal, true);
            }
            for expression in &mut self.expressions {
                expression.set_evaluatable(ordinal, true);
            }
            for filter in &mut self.filters {
                if let Some(join_condition) = &mut filter.join_condition {
                    join_condition.set_evaluatable(ordinal, true);
                }
            }
            next = self.filters[ordinal].join;
            let joined_outer = self.filters[ordinal].joined_outer;
            if let Some(on) = self.filters[ordinal].join_condition.take() {
                if !on.is_everything(&mut ExpressionVisitor::Evaluatable) && !joined_outer {
                    self.add_condition(on);
                } else {
                    self.filters[ordinal].join_condition = Some(on);
                }
            }
        }
        Ok(())
    }

    /// The single-column DISTINCT fast path: replace the scan with an
    /// ascending low-selectivity index and let execution seek from value
    /// to value.
    fn prepare_distinct_query(&mut self, database: &Database) -> Result<(), ExecutorError> {
        if !(self.distinct
            && database.settings.optimize_distinct
            && !self.is_group_query
            && self.filters.len() == 1
            && self.expressions.len() == 1
            && self.condition.is_none())
        {
            return Ok(());
        }
        let column = match self.expressions[0].non_alias() {
            Expression::Column(col) => match col.resolved {
                Some(ResolvedColumn::FilterColumn { column, .. }) => column,
                _ => return Ok(()),
            },
            _ => return Ok(()),
        };
        let top = self.top_table_filter.expect("planned");
        let table = self.filters[top].table(database)?;
        let selectivity = table.schema.columns[column].selectivity;
        if selectivity == SELECTIVITY_DEFAULT || selectivity >= 20 {
            return Ok(());
        }
        let (position, index) = match table.index_for_column(column) {
            Some(found) => found,
            None => return Ok(()),
        };
        let current = self.filters[top].index;
        if !index.can_find_next() || !(current.is_none() || current == Some(position)) {
            return Ok(());
        }
        // hash indexes cannot seek, and a unique single-column index
        // makes DISTINCT trivial without this plan
        let index_type = index.index_type;
        if index_type.is_hash() || (index_type.is_unique() && index.columns.len() == 1) {
            return Ok(());
        }
        self.filters[top].set_index(Some(position));
        self.is_distinct_query = true;
        log::debug!("distinct index scan via {}", index.name);
        Ok(())
    }

    /// Try to serve ORDER BY from an index, to avoid a separate sort.
    /// This matters most for large results where only the first few rows
    /// are needed.
    fn prepare_sort_index(&mut self, database: &Database) -> Result<(), ExecutorError> {
        let top = self.top_table_filter.expect("planned");
        let choice = match self.sort_index(database, top)? {
            Some(choice) => choice,
            None => return Ok(()),
        };
        match choice {
            SortIndexChoice::Scan => {
                // sort on constants only; every access path is sorted
                self.sort_using_index = true;
            }
            SortIndexChoice::Index(position) => {
                let current = self.filters[top].index;
                if current.is_none() || current == Some(position) {
                    self.filters[top].set_index(Some(position));
                    // IN(...) lookups may return keys out of index order
                    if !self.filters[top].has_in_comparisons {
                        self.sort_using_index = true;
                    }
                } else if let Some(current_position) = current {
                    let table = self.filters[top].table(database)?;
                    let candidate = table.index(position).expect("found above");
                    let current_index = table.index(current_position).expect("chosen earlier");
                    if candidate.columns.len() >= current_index.columns.len() {
                        let mut swap = false;
                        let mut same_columns = true;
                        for (i, cc) in current_index.columns.iter().enumerate() {
                            if candidate.columns[i].column != cc.column {
                                same_columns = false;
                                break;
                            }
                            if candidate.columns[i].descending != cc.descending
                                || candidate.columns[i].nulls_last != cc.nulls_last
                            {
                                swap = true;
                            }
                        }
                        if same_columns && swap {
                            self.filters[top].set_index(Some(position));
                            self.sort_using_index = true;
                        }
                    }
                }
            }
        }
        if self.sort_using_index {
            log::debug!("index sorted plan for {}", self.filters[top].table_name);
        }
        Ok(())
    }

    /// Find an index whose leading columns are exactly the sort columns
    /// with the same sort types and NULL positions.
    fn sort_index(
        &self,
        database: &Database,
        top: usize,
    ) -> Result<Option<SortIndexChoice>, ExecutorError> {
        let sort = match &self.sort {
            Some(sort) => sort,
            None => return Ok(None),
        };
        let mut sort_columns = Vec::new();
        let mut sort_specs = Vec::new();
        for (k, &idx) in sort.indexes.iter().enumerate() {
            if idx >= self.expressions.len() {
                return Err(ExecutorError::InvalidValue {
                    parameter: "ORDER BY".to_string(),
                    value: (idx + 1).to_string(),
                });
            }
            let expression = self.expressions[idx].non_alias();
            if expression.is_constant() {
                continue;
            }
            let column = match expression.as_filter_column(top) {
                Some(column) => column,
                None => return Ok(None),
            };
            sort_columns.push(column);
            sort_specs.push(sort.specs[k]);
        }
        if sort_columns.is_empty() {
            return Ok(Some(SortIndexChoice::Scan));
        }
        let table = self.filters[top].table(database)?;
        for (position, index) in table.indexes().iter().enumerate() {
            if index.index_type.is_hash() || index.columns.len() < sort_columns.len() {
                continue;
            }
            let matches = sort_columns.iter().zip(&sort_specs).enumerate().all(
                |(j, (&column, spec))| {
                    let ic = &index.columns[j];
                    ic.column == column
                        && ic.descending == spec.descending
                        && ic.nulls_last == spec.nulls_last
                },
            );
            if matches {
                return Ok(Some(SortIndexChoice::Index(position)));
            }
        }
        Ok(None)
    }

    /// Find an index whose columns cover all GROUP BY columns as an
    /// unbroken prefix (in any order within the prefix).
    fn group_sorted_index(&self, database: &Database) -> Result<Option<usize>, ExecutorError> {
        if self.group_index.is_none() || self.group_by_expression.is_none() {
            return Ok(None);
        }
        let top = self.top_table_filter.expect("planned");
        let table = self.filters[top].table(database)?;
        for (position, index) in table.indexes().iter().enumerate() {
            if index.index_type.is_hash() {
                // does not allow scanning entries
                continue;
            }
            if self.is_group_sorted_index(top, index) {
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    fn is_group_sorted_index(&self, top: usize, index: &opalsql_storage::Index) -> bool {
        let mask = self.group_by_expression.as_ref().expect("checked by caller");
        // check that all the GROUP BY expressions are part of the index
        let mut grouped = vec![false; index.columns.len()];
        for (i, expression) in self.expressions.iter().enumerate() {
            if !mask[i] {
                continue;
            }
            let column = match expression.non_alias().as_filter_column(top) {
                Some(column) => column,
                None => return false,
            };
            match index.columns.iter().position(|ic| ic.column == column) {
                Some(j) => grouped[j] = true,
                None => return false,
            }
        }
        // the matched columns must form an unbroken prefix:
        // good: index(a, b, c) with GROUP BY b, a
        // bad: index(a, b, c) with GROUP BY a, c
        for i in 1..grouped.len() {
            if !grouped[i - 1] && grouped[i] {
                return false;
            }
        }
        true
    }
}

fn prepare_order(order_list: &[SelectOrderBy]) -> SortOrder {
    let mut indexes = Vec::with_capacity(order_list.len());
    let mut specs = Vec::with_capacity(order_list.len());
    for item in order_list {
        indexes.push(item.column_index.expect("bound by init"));
        specs.push(SortSpec {
            descending: item.descending,
            nulls_last: item.nulls_last.unwrap_or(item.descending),
        });
    }
    SortOrder::new(indexes, specs)
}
