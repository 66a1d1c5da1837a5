//! Single-block SELECT execution for opalsql
//!
//! The core of the engine: it takes a bound statement tree (the parser's
//! output, built here through the [`Select`] setters), binds and plans
//! it, and executes it through one of five physical strategies:
//!
//! - quick aggregate (answers from table/index metadata, no scan)
//! - hashed grouping
//! - sorted grouping (streaming, relies on an index ordered by the
//!   group key)
//! - distinct single-column index scan
//! - flat scan
//!
//! Results are either materialized in a [`LocalResult`] or pulled row by
//! row through a [`LazyResult`].

mod context;
mod errors;
mod expression;
mod optimizer;
mod result;
mod select;
mod session;
mod sort;
mod table_filter;

pub use context::QueryContext;
pub use errors::ExecutorError;
pub use expression::{
    AggregateKind, ArithmeticOp, ColumnResolver, ComparisonOp, Expression, ExpressionVisitor,
    ResolvedColumn,
};
pub use result::{LocalResult, QueryResult, ResultTarget};
pub use select::lazy::LazyResult;
pub use select::{Select, SelectOrderBy};
pub use session::Session;
pub use sort::{SortOrder, SortSpec};
pub use table_filter::{IndexCondition, TableFilter};
