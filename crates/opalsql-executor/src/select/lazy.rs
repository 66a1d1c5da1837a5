//! Lazy results
//!
//! A pull-based result wrapping flat and group-sorted execution. The
//! driver owns the filter chain and execution context, so rows are
//! produced on demand; `reset` rewinds the scan and `close` tears it
//! down. Quick-offset rows are skipped before the result exposes
//! anything, and an optional hard limit caps emission.

use opalsql_types::SqlValue;

use crate::context::QueryContext;
use crate::errors::ExecutorError;
use crate::select::groups::QueryGroups;
use crate::select::Select;
use crate::session::Session;
use crate::table_filter::FilterChain;

enum LazyMode {
    Flat { sample_size: u64 },
    GroupSorted { previous_key: Option<Vec<SqlValue>> },
}

pub struct LazyResult<'a> {
    select: &'a Select,
    session: &'a Session<'a>,
    ctx: QueryContext<'a>,
    chain: FilterChain<'a>,
    mode: LazyMode,
    row_number: u64,
    limit: Option<u64>,
    emitted: u64,
    current: Option<Vec<SqlValue>>,
    after_last: bool,
    closed: bool,
}

impl<'a> LazyResult<'a> {
    pub(crate) fn new_flat(
        select: &'a Select,
        session: &'a Session<'a>,
        ctx: QueryContext<'a>,
        chain: FilterChain<'a>,
        sample_size: u64,
    ) -> Self {
        session.set_current_row_number(0);
        LazyResult {
            select,
            session,
            ctx,
            chain,
            mode: LazyMode::Flat { sample_size },
            row_number: 0,
            limit: None,
            emitted: 0,
            current: None,
            after_last: false,
            closed: false,
        }
    }

    pub(crate) fn new_group_sorted(
        select: &'a Select,
        session: &'a Session<'a>,
        mut ctx: QueryContext<'a>,
        chain: FilterChain<'a>,
    ) -> Self {
        session.set_current_row_number(0);
        ctx.groups = Some(QueryGroups::new(select.expressions.len()));
        LazyResult {
            select,
            session,
            ctx,
            chain,
            mode: LazyMode::GroupSorted { previous_key: None },
            row_number: 0,
            limit: None,
            emitted: 0,
            current: None,
            after_last: false,
            closed: false,
        }
    }

    pub fn visible_column_count(&self) -> usize {
        self.select.visible_column_count
    }

    /// Hard cap on emitted rows.
    pub(crate) fn set_limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }

    pub fn next(&mut self) -> Result<bool, ExecutorError> {
        if self.closed || self.after_last {
            return Ok(false);
        }
        if let Some(limit) = self.limit {
            if self.emitted >= limit {
                self.current = None;
                self.after_last = true;
                return Ok(false);
            }
        }
        match self.fetch_next_row()? {
            Some(row) => {
                self.current = Some(row);
                self.emitted += 1;
                Ok(true)
            }
            None => {
                self.current = None;
                self.after_last = true;
                Ok(false)
            }
        }
    }

    /// The current row, trimmed to the visible columns.
    pub fn current_row(&self) -> &[SqlValue] {
        let row = self.current.as_ref().expect("next() did not return true");
        &row[..self.select.visible_column_count.min(row.len())]
    }

    /// The full-width row, for draining into a buffered sink that still
    /// needs the appended sort and having columns.
    pub(crate) fn current_row_full(&self) -> &[SqlValue] {
        self.current.as_ref().expect("next() did not return true")
    }

    /// Row id under the top filter, for FOR UPDATE row locking.
    pub(crate) fn top_row_id(&self) -> Option<usize> {
        self.chain.top_row_id()
    }

    pub fn reset(&mut self) {
        self.chain.reset(&mut self.ctx);
        if let LazyMode::GroupSorted { previous_key } = &mut self.mode {
            *previous_key = None;
            self.ctx.groups = Some(QueryGroups::new(self.select.expressions.len()));
        }
        self.session.set_current_row_number(0);
        self.row_number = 0;
        self.emitted = 0;
        self.current = None;
        self.after_last = false;
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.current = None;
        }
    }

    fn fetch_next_row(&mut self) -> Result<Option<Vec<SqlValue>>, ExecutorError> {
        let select = self.select;
        match &mut self.mode {
            LazyMode::Flat { sample_size } => {
                let sample_size = *sample_size;
                while (sample_size == 0 || self.row_number < sample_size)
                    && self.chain.next(&mut self.ctx)?
                {
                    self.session.set_current_row_number(self.row_number + 1);
                    if select.is_condition_met(&self.ctx)? {
                        self.row_number += 1;
                        let mut row = Vec::with_capacity(select.expressions.len());
                        for expression in &select.expressions {
                            row.push(expression.evaluate(&self.ctx)?);
                        }
                        return Ok(Some(row));
                    }
                }
                Ok(None)
            }
            LazyMode::GroupSorted { previous_key } => {
                let group_index =
                    select.group_index.as_ref().expect("group sorted plan has group keys");
                while self.chain.next(&mut self.ctx)? {
                    self.session.set_current_row_number(self.row_number + 1);
                    if select.is_condition_met(&self.ctx)? {
                        self.row_number += 1;
                        let mut key_values = Vec::with_capacity(group_index.len());
                        for &index in group_index {
                            key_values.push(select.expressions[index].evaluate(&self.ctx)?);
                        }
                        let mut row = None;
                        match previous_key {
                            None => {
                                self.ctx
                                    .groups
                                    .as_mut()
                                    .expect("set by constructor")
                                    .begin_sorted_group();
                                *previous_key = Some(key_values);
                            }
                            Some(previous) if *previous != key_values => {
                                // key changed: emit the finished group
                                let finished = std::mem::replace(previous, key_values);
                                row = select.create_group_sorted_row(&finished, &self.ctx)?;
                                self.ctx
                                    .groups
                                    .as_mut()
                                    .expect("set by constructor")
                                    .begin_sorted_group();
                            }
                            Some(_) => {}
                        }
                        self.ctx.groups.as_mut().expect("set by constructor").next_row();
                        for (i, expression) in select.expressions.iter().enumerate() {
                            let grouped =
                                select.group_by_expression.as_ref().map_or(false, |m| m[i]);
                            if !grouped {
                                expression.update_aggregate(&mut self.ctx)?;
                            }
                        }
                        if let Some(row) = row {
                            return Ok(Some(row));
                        }
                    }
                }
                // end of scan: the last pending group
                if let Some(previous) = previous_key.take() {
                    if let Some(row) = select.create_group_sorted_row(&previous, &self.ctx)? {
                        return Ok(Some(row));
                    }
                }
                Ok(None)
            }
        }
    }
}
