//! Execution: strategy selection and the five strategies
//!
//! `query_without_cache` resolves limit and offset, decides lazy
//! eligibility, acquires locks, and drives exactly one of: quick
//! aggregate, hashed grouping, sorted grouping, distinct index scan, or
//! the flat scan. Materialized executions finish by running the sink's
//! deferred pipeline; lazy ones hand the driver to the caller.

use opalsql_types::SqlValue;

use crate::context::QueryContext;
use crate::errors::ExecutorError;
use crate::result::{LocalResult, QueryResult, ResultTarget};
use crate::select::groups::QueryGroups;
use crate::select::lazy::LazyResult;
use crate::select::Select;
use crate::session::Session;
use crate::table_filter::FilterChain;

impl Select {
    /// Execute the prepared statement.
    ///
    /// `max_rows` of 0 means unlimited. With a `target`, rows are drained
    /// into it and `None` is returned; otherwise the result is either
    /// materialized or lazy.
    pub fn query_without_cache<'s>(
        &'s self,
        session: &'s Session<'s>,
        max_rows: i64,
        mut target: Option<&mut dyn ResultTarget>,
    ) -> Result<Option<QueryResult<'s>>, ExecutorError> {
        if !self.is_prepared {
            return Err(ExecutorError::Internal("select not prepared".to_string()));
        }
        let database = session.database();
        let const_ctx = QueryContext::new(session, self.filters.len(), &self.expressions);

        let mut limit_rows: i64 = if max_rows == 0 { -1 } else { max_rows };
        if let Some(limit_expr) = &self.limit_expr {
            let value = limit_expr.evaluate(&const_ctx)?;
            let l = if value.is_null() { -1 } else { value.as_i64().unwrap_or(-1) };
            if limit_rows < 0 {
                limit_rows = l;
            } else if l >= 0 {
                limit_rows = limit_rows.min(l);
            }
        }
        let mut fetch_percent = self.fetch_percent;
        if fetch_percent {
            if !(0..=100).contains(&limit_rows) {
                return Err(ExecutorError::InvalidValue {
                    parameter: "FETCH PERCENT".to_string(),
                    value: limit_rows.to_string(),
                });
            }
            // 0 PERCENT means 0 rows
            if limit_rows == 0 {
                fetch_percent = false;
            }
        }
        let mut offset: i64 = match &self.offset_expr {
            Some(expr) => expr.evaluate(&const_ctx)?.as_i64().unwrap_or(0).max(0),
            None => 0,
        };

        // the distinct index scan has no lazy driver, so it stays on the
        // materialized path
        let mut lazy = session.is_lazy_query_execution()
            && target.is_none()
            && !self.is_for_update
            && !self.is_quick_aggregate_query
            && !self.is_distinct_query
            && limit_rows != 0
            && !fetch_percent
            && !self.with_ties
            && offset == 0
            && self.is_read_only();

        let mut result: Option<LocalResult> = None;
        if !lazy && (target.is_none() || !database.settings.optimize_insert_from_select) {
            result = Some(self.create_local_result(result.take()));
        }
        // do not add rows before OFFSET to the sink when possible
        let mut quick_offset = !fetch_percent;
        if let Some(sort) = &self.sort {
            if !self.sort_using_index || self.is_any_distinct() || self.with_ties {
                let r = self.ensure_local_result(&mut result);
                r.set_sort_order(sort.clone());
                if !self.sort_using_index {
                    quick_offset = false;
                }
            }
        }
        if self.distinct {
            if !self.is_distinct_query {
                quick_offset = false;
                self.ensure_local_result(&mut result).set_distinct();
            }
        } else if let Some(indexes) = &self.distinct_indexes {
            quick_offset = false;
            self.ensure_local_result(&mut result).set_distinct_on(indexes.clone());
        }
        if self.is_group_query && !self.is_group_sorted_query {
            self.ensure_local_result(&mut result);
        }
        if !lazy && (limit_rows >= 0 || offset > 0) {
            self.ensure_local_result(&mut result);
        }

        let top = self
            .top_table_filter
            .ok_or_else(|| ExecutorError::Internal("no top table filter".to_string()))?;
        let mut ctx = QueryContext::new(session, self.filters.len(), &self.expressions);
        let mut chain = FilterChain::new(&self.filters, top);
        chain.reset(&mut ctx);

        let exclusive = self.is_for_update && !self.is_for_update_mvcc;
        if self.is_for_update_mvcc {
            if self.is_group_query {
                return Err(ExecutorError::UnsupportedFeature(
                    "MVCC=TRUE && FOR UPDATE && GROUP".to_string(),
                ));
            } else if self.is_any_distinct() {
                return Err(ExecutorError::UnsupportedFeature(
                    "MVCC=TRUE && FOR UPDATE && DISTINCT".to_string(),
                ));
            } else if self.is_quick_aggregate_query {
                return Err(ExecutorError::UnsupportedFeature(
                    "MVCC=TRUE && FOR UPDATE && AGGREGATE".to_string(),
                ));
            } else if chain.len() > 1 {
                return Err(ExecutorError::UnsupportedFeature(
                    "MVCC=TRUE && FOR UPDATE && JOIN".to_string(),
                ));
            }
        }
        chain.top().lock(session, exclusive)?;

        lazy &= result.is_none() && target.is_none();

        let mut lazy_result: Option<LazyResult<'s>> = None;
        if limit_rows != 0 {
            // cannot apply the limit during the scan when percent is set
            let limit = if fetch_percent { -1 } else { limit_rows };
            let to: Option<&mut dyn ResultTarget> = if let Some(r) = result.as_mut() {
                Some(r)
            } else if let Some(t) = target.as_mut() {
                Some(&mut **t)
            } else {
                None
            };
            if self.is_quick_aggregate_query {
                ctx.direct_lookup_table = Some(&self.filters[top].table_name);
                self.query_quick(&ctx, to, quick_offset && offset > 0)?;
            } else if self.is_group_query {
                if self.is_group_sorted_query {
                    lazy_result =
                        self.query_group_sorted(session, ctx, chain, to, offset, quick_offset)?;
                } else {
                    self.query_group(session, &mut ctx, &mut chain, to, offset, quick_offset)?;
                }
            } else if self.is_distinct_query {
                self.query_distinct(&ctx, to, offset, limit, quick_offset)?;
            } else {
                lazy_result = self.query_flat(
                    session,
                    ctx,
                    chain,
                    to,
                    offset,
                    limit,
                    quick_offset,
                )?;
            }
            if quick_offset {
                offset = 0;
            }
        }

        debug_assert_eq!(lazy, lazy_result.is_some());
        if let Some(mut lazy_result) = lazy_result {
            if limit_rows > 0 {
                lazy_result.set_limit(limit_rows as u64);
            }
            if self.random_access_result {
                let converted = self.convert_lazy_to_distinct(lazy_result)?;
                return Ok(Some(QueryResult::Materialized(converted)));
            }
            return Ok(Some(QueryResult::Lazy(lazy_result)));
        }

        if let Some(mut result) = result {
            if offset != 0 {
                if offset > i32::MAX as i64 {
                    return Err(ExecutorError::InvalidValue {
                        parameter: "OFFSET".to_string(),
                        value: offset.to_string(),
                    });
                }
                result.set_offset(offset as usize);
            }
            if limit_rows >= 0 {
                result.set_limit(limit_rows);
                result.set_fetch_percent(fetch_percent);
                result.set_with_ties(self.with_ties);
            }
            result.done();
            if self.random_access_result && !self.distinct {
                result = self.convert_to_distinct(result)?;
            }
            if let Some(target) = target {
                result.reset();
                while result.next() {
                    target.add_row(result.current_row().to_vec())?;
                }
                result.close();
                return Ok(None);
            }
            return Ok(Some(QueryResult::Materialized(result)));
        }
        Ok(None)
    }

    fn create_local_result(&self, old: Option<LocalResult>) -> LocalResult {
        old.unwrap_or_else(|| {
            LocalResult::new(self.column_names.clone(), self.visible_column_count)
        })
    }

    fn ensure_local_result<'r>(&self, result: &'r mut Option<LocalResult>) -> &'r mut LocalResult {
        if result.is_none() {
            *result = Some(self.create_local_result(None));
        }
        result.as_mut().expect("just ensured")
    }

    /// Quick aggregate: one row straight from metadata, no scan.
    fn query_quick(
        &self,
        ctx: &QueryContext<'_>,
        to: Option<&mut dyn ResultTarget>,
        skip_result: bool,
    ) -> Result<(), ExecutorError> {
        let mut row = Vec::with_capacity(self.expressions.len());
        for expression in &self.expressions {
            row.push(expression.evaluate(ctx)?);
        }
        if !skip_result {
            if let Some(to) = to {
                to.add_row(row)?;
            }
        }
        Ok(())
    }

    /// Hashed grouping: scan everything into the group-state store, then
    /// emit one row per group.
    fn query_group(
        &self,
        session: &Session<'_>,
        ctx: &mut QueryContext<'_>,
        chain: &mut FilterChain<'_>,
        to: Option<&mut dyn ResultTarget>,
        offset: i64,
        quick_offset: bool,
    ) -> Result<(), ExecutorError> {
        let to = to.ok_or_else(|| {
            ExecutorError::Internal("group query without a result sink".to_string())
        })?;
        ctx.groups = Some(QueryGroups::new(self.expressions.len()));
        let mut row_number: u64 = 0;
        session.set_current_row_number(0);
        let sample_size = self.sample_size(ctx)?;
        let mut offset = offset;
        while chain.next(ctx)? {
            session.set_current_row_number(row_number + 1);
            if self.is_condition_met(ctx)? {
                row_number += 1;
                let key = self.group_key(ctx)?;
                let groups = ctx.groups.as_mut().expect("installed above");
                groups.enter_group(key);
                groups.next_row();
                for (i, expression) in self.expressions.iter().enumerate() {
                    let grouped = self.group_by_expression.as_ref().map_or(false, |m| m[i]);
                    if !grouped {
                        expression.update_aggregate(ctx)?;
                    }
                }
                if sample_size > 0 && row_number >= sample_size {
                    break;
                }
            }
        }
        {
            let groups = ctx.groups.as_mut().expect("installed above");
            if self.group_index.is_none() && groups.group_count() == 0 {
                // SELECT COUNT(*) FROM empty still returns one row
                groups.ensure_default_group();
            }
        }
        let entries = ctx.groups.as_ref().expect("installed above").group_entries();
        for (key, position) in entries {
            ctx.groups.as_mut().expect("installed above").set_current(position);
            let key_values = match key {
                SqlValue::Array(values) => values,
                _ => Vec::new(),
            };
            if let Some(row) = self.create_group_sorted_row(&key_values, ctx)? {
                if quick_offset && offset > 0 {
                    offset -= 1;
                    continue;
                }
                to.add_row(row)?;
            }
        }
        ctx.groups = None;
        Ok(())
    }

    /// Sorted grouping: the scan is ordered on the group key, so groups
    /// stream out as the key changes. Lazy-capable.
    #[allow(clippy::too_many_arguments)]
    fn query_group_sorted<'s>(
        &'s self,
        session: &'s Session<'s>,
        ctx: QueryContext<'s>,
        chain: FilterChain<'s>,
        to: Option<&mut dyn ResultTarget>,
        offset: i64,
        quick_offset: bool,
    ) -> Result<Option<LazyResult<'s>>, ExecutorError> {
        let mut lazy_result = LazyResult::new_group_sorted(self, session, ctx, chain);
        skip_offset(&mut lazy_result, offset, quick_offset)?;
        match to {
            None => Ok(Some(lazy_result)),
            Some(to) => {
                while lazy_result.next()? {
                    to.add_row(lazy_result.current_row_full().to_vec())?;
                }
                Ok(None)
            }
        }
    }

    /// Distinct single-column index scan: seek just past each returned
    /// value instead of visiting every row.
    fn query_distinct(
        &self,
        ctx: &QueryContext<'_>,
        to: Option<&mut dyn ResultTarget>,
        mut offset: i64,
        mut limit_rows: i64,
        quick_offset: bool,
    ) -> Result<(), ExecutorError> {
        let to = to.ok_or_else(|| {
            ExecutorError::Internal("distinct query without a result sink".to_string())
        })?;
        if limit_rows > 0 && offset > 0 {
            limit_rows = limit_rows.saturating_add(offset);
        }
        let mut row_number: i64 = 0;
        ctx.session.set_current_row_number(0);
        let top = self.top_table_filter.expect("planned");
        let filter = &self.filters[top];
        let table = filter.table(ctx.database())?;
        let index = filter
            .index
            .and_then(|position| table.index(position))
            .ok_or_else(|| ExecutorError::Internal("distinct plan lost its index".to_string()))?;
        let sample_size = self.sample_size(ctx)? as i64;
        if !quick_offset {
            offset = 0;
        }
        let mut last_key: Option<Vec<SqlValue>> = None;
        loop {
            row_number += 1;
            ctx.session.set_current_row_number(row_number as u64);
            let found = match &last_key {
                None => index.first(),
                Some(key) => index.find_next(key),
            };
            let (key, _) = match found {
                Some(entry) => entry,
                None => break,
            };
            let value = key[0].clone();
            last_key = Some(vec![value.clone()]);
            if offset > 0 {
                offset -= 1;
                continue;
            }
            to.add_row(vec![value])?;
            if (self.sort.is_none() || self.sort_using_index)
                && limit_rows > 0
                && row_number >= limit_rows
                && !self.with_ties
            {
                break;
            }
            if sample_size > 0 && row_number >= sample_size {
                break;
            }
        }
        Ok(())
    }

    /// Flat scan through WHERE and projection. Lazy-capable; under FOR
    /// UPDATE MVCC the drain buffers row locks and installs them at scan
    /// end.
    #[allow(clippy::too_many_arguments)]
    fn query_flat<'s>(
        &'s self,
        session: &'s Session<'s>,
        ctx: QueryContext<'s>,
        chain: FilterChain<'s>,
        to: Option<&mut dyn ResultTarget>,
        offset: i64,
        mut limit_rows: i64,
        quick_offset: bool,
    ) -> Result<Option<LazyResult<'s>>, ExecutorError> {
        if limit_rows > 0 && offset > 0 && !quick_offset {
            limit_rows = limit_rows.saturating_add(offset);
        }
        let sample_size = self.sample_size(&ctx)?;
        let mut lazy_result = LazyResult::new_flat(self, session, ctx, chain, sample_size);
        skip_offset(&mut lazy_result, offset, quick_offset)?;
        let to = match to {
            None => return Ok(Some(lazy_result)),
            Some(to) => to,
        };
        let mut limit = limit_rows;
        if limit < 0
            || self.sort.is_some() && !self.sort_using_index
            || self.with_ties && !quick_offset
        {
            limit = i64::MAX;
        }
        let mut for_update_rows: Option<Vec<usize>> =
            if self.is_for_update_mvcc { Some(Vec::new()) } else { None };
        let mut last_row: Option<Vec<SqlValue>> = None;
        while (to.row_count() as i64) < limit && lazy_result.next()? {
            if let Some(buffer) = &mut for_update_rows {
                if let Some(row_id) = lazy_result.top_row_id() {
                    buffer.push(row_id);
                }
            }
            let row = lazy_result.current_row_full().to_vec();
            last_row = Some(row.clone());
            to.add_row(row)?;
        }
        if limit != i64::MAX && self.with_ties && self.sort.is_some() {
            if let Some(expected) = last_row {
                let sort = self.sort.as_ref().expect("checked above");
                while lazy_result.next()? {
                    let row = lazy_result.current_row_full().to_vec();
                    if sort.compare(&expected, &row) != std::cmp::Ordering::Equal {
                        break;
                    }
                    if let Some(buffer) = &mut for_update_rows {
                        if let Some(row_id) = lazy_result.top_row_id() {
                            buffer.push(row_id);
                        }
                    }
                    to.add_row(row)?;
                }
                to.limits_were_applied();
            }
        }
        if let Some(buffer) = for_update_rows {
            let top = self.top_table_filter.expect("planned");
            session.database().lock_rows(
                session.id(),
                &self.filters[top].table_name,
                &buffer,
            )?;
        }
        Ok(None)
    }

    fn convert_to_distinct(&self, mut result: LocalResult) -> Result<LocalResult, ExecutorError> {
        let mut distinct_result =
            LocalResult::new(self.column_names.clone(), self.visible_column_count);
        distinct_result.set_distinct();
        result.reset();
        while result.next() {
            distinct_result.add_row(result.current_row().to_vec())?;
        }
        result.close();
        distinct_result.done();
        Ok(distinct_result)
    }

    fn convert_lazy_to_distinct(
        &self,
        mut lazy_result: LazyResult<'_>,
    ) -> Result<LocalResult, ExecutorError> {
        let mut distinct_result =
            LocalResult::new(self.column_names.clone(), self.visible_column_count);
        distinct_result.set_distinct();
        while lazy_result.next()? {
            distinct_result.add_row(lazy_result.current_row().to_vec())?;
        }
        lazy_result.close();
        distinct_result.done();
        Ok(distinct_result)
    }
}

fn skip_offset(
    lazy_result: &mut LazyResult<'_>,
    offset: i64,
    quick_offset: bool,
) -> Result<(), ExecutorError> {
    if quick_offset {
        let mut remaining = offset;
        while remaining > 0 && lazy_result.next()? {
            remaining -= 1;
        }
    }
    Ok(())
}
