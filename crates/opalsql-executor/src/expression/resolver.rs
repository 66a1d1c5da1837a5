//! Column resolution
//!
//! Binding walks every expression once per column source. A source is
//! either a table filter (FROM clause) or the projection list itself --
//! the latter lets HAVING reference select-list aliases and aggregate
//! results.

use opalsql_storage::Database;
use opalsql_types::DataType;

use crate::expression::Expression;

/// Where a bound column reference points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedColumn {
    /// Column `column` of the filter at ordinal `filter`.
    FilterColumn { filter: usize, column: usize },
    /// Position in the projection list; evaluating re-evaluates that
    /// select expression under the current context.
    SelectIndex { index: usize },
}

pub trait ColumnResolver {
    /// Try to bind `name` (optionally qualified by a table alias). Returns
    /// the resolution and the column's declared type when known.
    fn resolve_column(
        &self,
        database: &Database,
        table: Option<&str>,
        name: &str,
    ) -> Option<(ResolvedColumn, DataType)>;
}

/// Resolver over the projection list, used to bind HAVING.
pub struct SelectListColumnResolver<'a> {
    expressions: &'a [Expression],
    visible_column_count: usize,
}

impl<'a> SelectListColumnResolver<'a> {
    pub fn new(expressions: &'a [Expression], visible_column_count: usize) -> Self {
        SelectListColumnResolver { expressions, visible_column_count }
    }
}

impl ColumnResolver for SelectListColumnResolver<'_> {
    fn resolve_column(
        &self,
        database: &Database,
        table: Option<&str>,
        name: &str,
    ) -> Option<(ResolvedColumn, DataType)> {
        if table.is_some() {
            return None;
        }
        for (index, expr) in self.expressions.iter().enumerate().take(self.visible_column_count) {
            if database.equals_identifiers(&expr.alias_or_derived_name(), name) {
                return Some((ResolvedColumn::SelectIndex { index }, DataType::Null));
            }
        }
        None
    }
}
