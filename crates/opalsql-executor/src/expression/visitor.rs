//! Expression visitors
//!
//! A visitor is a predicate carried through `Expression::is_everything`;
//! the walk short-circuits on the first node that fails it.

use opalsql_storage::Table;

pub enum ExpressionVisitor<'a> {
    /// No node reads or writes anything outside the current row.
    ReadOnly,
    /// Repeated evaluation over the same state yields the same value.
    Deterministic,
    /// Every column reference is bound to a filter whose row is available
    /// at this point of the join order.
    Evaluatable,
    /// The expression's type supports ordering comparisons, so a
    /// parameterized predicate against it is well-formed.
    QueryComparable,
    /// The expression can be answered from table metadata without a scan:
    /// constants, COUNT(*), and MIN/MAX over an indexed column.
    OptimizableAggregate { table: &'a Table },
    /// The expression references no columns at all.
    Independent,
}
