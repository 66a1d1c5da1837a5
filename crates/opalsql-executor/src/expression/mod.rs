//! Expressions consumed by the SELECT core
//!
//! Tagged variants with method dispatch; there is no inheritance
//! hierarchy. The statement owns its expressions exclusively; column
//! references hold indices into the statement's filter list instead of
//! back-pointers, which keeps the expression / statement / filter graph
//! acyclic.

mod aggregate;
mod resolver;
mod visitor;

pub use aggregate::{AggregateKind, AggregateState};
pub use resolver::{ColumnResolver, ResolvedColumn, SelectListColumnResolver};
pub use visitor::ExpressionVisitor;

use opalsql_storage::{Database, Table};
use opalsql_types::{DataType, SqlValue};

use crate::context::QueryContext;
use crate::errors::ExecutorError;
use crate::session::Session;
use crate::table_filter::IndexCondition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// NULL-safe equality: NULL compares equal to NULL, never unknown.
    EqualNullSafe,
}

impl ComparisonOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "<>",
            ComparisonOp::Less => "<",
            ComparisonOp::LessEqual => "<=",
            ComparisonOp::Greater => ">",
            ComparisonOp::GreaterEqual => ">=",
            ComparisonOp::EqualNullSafe => "IS NOT DISTINCT FROM",
        }
    }

    /// The operator with sides swapped: `a < b` is `b > a`.
    pub fn flip(&self) -> ComparisonOp {
        match self {
            ComparisonOp::Less => ComparisonOp::Greater,
            ComparisonOp::LessEqual => ComparisonOp::GreaterEqual,
            ComparisonOp::Greater => ComparisonOp::Less,
            ComparisonOp::GreaterEqual => ComparisonOp::LessEqual,
            other => *other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
        }
    }
}

/// A column reference, unresolved until binding.
#[derive(Debug, Clone)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
    pub resolved: Option<ResolvedColumn>,
    pub data_type: DataType,
    pub evaluatable: bool,
}

/// An aggregate call. `id` is assigned during binding and keys the
/// aggregate's slot in the group-state store.
#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub kind: AggregateKind,
    pub distinct: bool,
    pub arg: Option<Box<Expression>>,
    pub id: usize,
}

impl AggregateExpr {
    /// Whether this aggregate can be answered from `table`'s metadata
    /// without scanning: COUNT(*), or MIN/MAX over an indexed column.
    fn is_direct_lookup(&self, table: &Table) -> bool {
        if self.distinct {
            return false;
        }
        match self.kind {
            AggregateKind::CountAll => true,
            AggregateKind::Min | AggregateKind::Max => match &self.arg {
                Some(arg) => match arg.non_alias() {
                    Expression::Column(col) => match col.resolved {
                        Some(ResolvedColumn::FilterColumn { column, .. }) => {
                            table.index_for_column(column).is_some()
                        }
                        _ => false,
                    },
                    _ => false,
                },
                None => false,
            },
            _ => false,
        }
    }

    fn direct_lookup(&self, table: &Table) -> Result<SqlValue, ExecutorError> {
        match self.kind {
            AggregateKind::CountAll => Ok(SqlValue::Integer(table.row_count() as i64)),
            AggregateKind::Min | AggregateKind::Max => {
                let column = match self.arg.as_deref().map(Expression::non_alias) {
                    Some(Expression::Column(col)) => match col.resolved {
                        Some(ResolvedColumn::FilterColumn { column, .. }) => column,
                        _ => {
                            return Err(ExecutorError::Internal(
                                "direct lookup on unbound column".to_string(),
                            ))
                        }
                    },
                    _ => {
                        return Err(ExecutorError::Internal(
                            "direct lookup without column argument".to_string(),
                        ))
                    }
                };
                let (_, index) = table.index_for_column(column).ok_or_else(|| {
                    ExecutorError::Internal("direct lookup without index".to_string())
                })?;
                let value = if self.kind == AggregateKind::Min {
                    index.min_value()
                } else {
                    index.max_value()
                };
                Ok(value.unwrap_or(SqlValue::Null))
            }
            _ => Err(ExecutorError::Internal("aggregate not optimizable".to_string())),
        }
    }

    fn sql_text(&self) -> String {
        match &self.arg {
            None => format!("{}(*)", self.kind.sql_name()),
            Some(arg) => {
                if self.distinct {
                    format!("{}(DISTINCT {})", self.kind.sql_name(), arg.sql_text())
                } else {
                    format!("{}({})", self.kind.sql_name(), arg.sql_text())
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(SqlValue),
    Parameter { index: usize },
    Column(ColumnRef),
    Wildcard { table: Option<String> },
    Alias { name: String, auto_generated: bool, inner: Box<Expression> },
    Comparison { op: ComparisonOp, left: Box<Expression>, right: Box<Expression> },
    AndOr { and: bool, left: Box<Expression>, right: Box<Expression> },
    /// Logical NOT, with three-valued semantics: NOT unknown is unknown.
    Negate(Box<Expression>),
    Arithmetic { op: ArithmeticOp, left: Box<Expression>, right: Box<Expression> },
    Aggregate(AggregateExpr),
}

impl Expression {
    pub fn literal(value: SqlValue) -> Expression {
        Expression::Literal(value)
    }

    pub fn integer(value: i64) -> Expression {
        Expression::Literal(SqlValue::Integer(value))
    }

    pub fn parameter(index: usize) -> Expression {
        Expression::Parameter { index }
    }

    pub fn column(name: &str) -> Expression {
        Expression::Column(ColumnRef {
            table: None,
            name: name.to_string(),
            resolved: None,
            data_type: DataType::Null,
            evaluatable: false,
        })
    }

    pub fn qualified_column(table: &str, name: &str) -> Expression {
        Expression::Column(ColumnRef {
            table: Some(table.to_string()),
            name: name.to_string(),
            resolved: None,
            data_type: DataType::Null,
            evaluatable: false,
        })
    }

    pub fn wildcard() -> Expression {
        Expression::Wildcard { table: None }
    }

    pub fn qualified_wildcard(table: &str) -> Expression {
        Expression::Wildcard { table: Some(table.to_string()) }
    }

    pub fn alias(name: &str, inner: Expression) -> Expression {
        Expression::Alias { name: name.to_string(), auto_generated: false, inner: Box::new(inner) }
    }

    pub fn comparison(op: ComparisonOp, left: Expression, right: Expression) -> Expression {
        Expression::Comparison { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn and(left: Expression, right: Expression) -> Expression {
        Expression::AndOr { and: true, left: Box::new(left), right: Box::new(right) }
    }

    pub fn or(left: Expression, right: Expression) -> Expression {
        Expression::AndOr { and: false, left: Box::new(left), right: Box::new(right) }
    }

    pub fn not(inner: Expression) -> Expression {
        Expression::Negate(Box::new(inner))
    }

    pub fn arithmetic(op: ArithmeticOp, left: Expression, right: Expression) -> Expression {
        Expression::Arithmetic { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn aggregate(kind: AggregateKind, arg: Option<Expression>, distinct: bool) -> Expression {
        Expression::Aggregate(AggregateExpr { kind, distinct, arg: arg.map(Box::new), id: 0 })
    }

    pub fn count_star() -> Expression {
        Expression::aggregate(AggregateKind::CountAll, None, false)
    }

    /// Evaluate under the execution context. Aggregates read their group
    /// state (or table metadata under a direct-lookup plan).
    pub fn evaluate(&self, ctx: &QueryContext<'_>) -> Result<SqlValue, ExecutorError> {
        match self {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Parameter { index } => ctx.session.parameter(*index),
            Expression::Column(col) => match col.resolved {
                Some(ResolvedColumn::FilterColumn { filter, column }) => {
                    match ctx.filter_row(filter) {
                        Some(row) => Ok(row.values[column].clone()),
                        None => Err(ExecutorError::Internal(format!(
                            "no current row for filter {}",
                            filter
                        ))),
                    }
                }
                Some(ResolvedColumn::SelectIndex { index }) => {
                    match ctx.select_expressions.get(index) {
                        Some(expr) => expr.evaluate(ctx),
                        None => Err(ExecutorError::Internal(
                            "select-list reference out of range".to_string(),
                        )),
                    }
                }
                None => Err(ExecutorError::ColumnNotFound(col.name.clone())),
            },
            Expression::Wildcard { .. } => {
                Err(ExecutorError::Internal("wildcard not expanded".to_string()))
            }
            Expression::Alias { inner, .. } => inner.evaluate(ctx),
            Expression::Comparison { op, left, right } => {
                let l = left.evaluate(ctx)?;
                let r = right.evaluate(ctx)?;
                if *op == ComparisonOp::EqualNullSafe {
                    return Ok(SqlValue::Boolean(l == r));
                }
                if l.is_null() || r.is_null() {
                    return Ok(SqlValue::Null);
                }
                let ord = l.partial_cmp(&r).ok_or_else(|| ExecutorError::TypeMismatch {
                    left: l.type_name().to_string(),
                    op: op.symbol().to_string(),
                    right: r.type_name().to_string(),
                })?;
                let result = match op {
                    ComparisonOp::Equal => ord == std::cmp::Ordering::Equal,
                    ComparisonOp::NotEqual => ord != std::cmp::Ordering::Equal,
                    ComparisonOp::Less => ord == std::cmp::Ordering::Less,
                    ComparisonOp::LessEqual => ord != std::cmp::Ordering::Greater,
                    ComparisonOp::Greater => ord == std::cmp::Ordering::Greater,
                    ComparisonOp::GreaterEqual => ord != std::cmp::Ordering::Less,
                    ComparisonOp::EqualNullSafe => unreachable!(),
                };
                Ok(SqlValue::Boolean(result))
            }
            Expression::AndOr { and, left, right } => {
                let l = left.evaluate(ctx)?.as_bool();
                // three-valued short circuit
                if *and && l == Some(false) {
                    return Ok(SqlValue::Boolean(false));
                }
                if !*and && l == Some(true) {
                    return Ok(SqlValue::Boolean(true));
                }
                let r = right.evaluate(ctx)?.as_bool();
                let result = if *and {
                    match (l, r) {
                        (Some(false), _) | (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    }
                } else {
                    match (l, r) {
                        (Some(true), _) | (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    }
                };
                Ok(result.map(SqlValue::Boolean).unwrap_or(SqlValue::Null))
            }
            Expression::Negate(inner) => Ok(match inner.evaluate(ctx)?.as_bool() {
                Some(value) => SqlValue::Boolean(!value),
                None => SqlValue::Null,
            }),
            Expression::Arithmetic { op, left, right } => {
                let l = left.evaluate(ctx)?;
                let r = right.evaluate(ctx)?;
                if l.is_null() || r.is_null() {
                    return Ok(SqlValue::Null);
                }
                if let (SqlValue::Integer(a), SqlValue::Integer(b)) = (&l, &r) {
                    return match op {
                        ArithmeticOp::Add => Ok(SqlValue::Integer(a.wrapping_add(*b))),
                        ArithmeticOp::Subtract => Ok(SqlValue::Integer(a.wrapping_sub(*b))),
                        ArithmeticOp::Multiply => Ok(SqlValue::Integer(a.wrapping_mul(*b))),
                        ArithmeticOp::Divide => {
                            if *b == 0 {
                                Err(ExecutorError::DivisionByZero)
                            } else {
                                Ok(SqlValue::Integer(a / b))
                            }
                        }
                    };
                }
                match (l.as_f64(), r.as_f64()) {
                    (Some(a), Some(b)) => match op {
                        ArithmeticOp::Add => Ok(SqlValue::Double(a + b)),
                        ArithmeticOp::Subtract => Ok(SqlValue::Double(a - b)),
                        ArithmeticOp::Multiply => Ok(SqlValue::Double(a * b)),
                        ArithmeticOp::Divide => {
                            if b == 0.0 {
                                Err(ExecutorError::DivisionByZero)
                            } else {
                                Ok(SqlValue::Double(a / b))
                            }
                        }
                    },
                    _ => Err(ExecutorError::TypeMismatch {
                        left: l.type_name().to_string(),
                        op: op.symbol().to_string(),
                        right: r.type_name().to_string(),
                    }),
                }
            }
            Expression::Aggregate(agg) => {
                if let Some(table_name) = ctx.direct_lookup_table {
                    let table = ctx
                        .database()
                        .get_table(table_name)
                        .ok_or_else(|| ExecutorError::TableNotFound(table_name.to_string()))?;
                    return agg.direct_lookup(table);
                }
                let groups = ctx.groups.as_ref().ok_or_else(|| {
                    ExecutorError::Internal("aggregate outside grouping context".to_string())
                })?;
                Ok(match groups.state(agg.id) {
                    Some(state) => state.finalize(),
                    None => agg.kind.empty_value(),
                })
            }
        }
    }

    /// Boolean interpretation with NULL treated as false.
    pub fn boolean_value(&self, ctx: &QueryContext<'_>) -> Result<bool, ExecutorError> {
        Ok(self.evaluate(ctx)?.as_bool().unwrap_or(false))
    }

    /// Fold this row into the aggregation state of the current group.
    pub fn update_aggregate(&self, ctx: &mut QueryContext<'_>) -> Result<(), ExecutorError> {
        match self {
            Expression::Aggregate(agg) => {
                let value = match (&agg.kind, &agg.arg) {
                    (AggregateKind::CountAll, _) => None,
                    (_, Some(arg)) => Some(arg.evaluate(ctx)?),
                    (_, None) => {
                        return Err(ExecutorError::Internal(
                            "aggregate without argument".to_string(),
                        ))
                    }
                };
                let groups = ctx.groups.as_mut().ok_or_else(|| {
                    ExecutorError::Internal("aggregate outside grouping context".to_string())
                })?;
                groups.update(agg.id, agg.kind, agg.distinct, value.as_ref())
            }
            Expression::Alias { inner, .. } => inner.update_aggregate(ctx),
            Expression::Negate(inner) => inner.update_aggregate(ctx),
            Expression::Comparison { left, right, .. }
            | Expression::AndOr { left, right, .. }
            | Expression::Arithmetic { left, right, .. } => {
                left.update_aggregate(ctx)?;
                right.update_aggregate(ctx)
            }
            _ => Ok(()),
        }
    }

    /// Optimize the expression tree: recurse, then fold constant operator
    /// nodes into literals. Unbound columns surface here.
    pub fn optimize(self, session: &Session<'_>) -> Result<Expression, ExecutorError> {
        match self {
            Expression::Column(col) => {
                if col.resolved.is_none() {
                    return Err(ExecutorError::ColumnNotFound(col.name));
                }
                Ok(Expression::Column(col))
            }
            Expression::Wildcard { .. } => {
                Err(ExecutorError::Internal("wildcard not expanded".to_string()))
            }
            Expression::Alias { name, auto_generated, inner } => Ok(Expression::Alias {
                name,
                auto_generated,
                inner: Box::new(inner.optimize(session)?),
            }),
            Expression::Comparison { op, left, right } => Self::fold(
                session,
                Expression::Comparison {
                    op,
                    left: Box::new(left.optimize(session)?),
                    right: Box::new(right.optimize(session)?),
                },
            ),
            Expression::AndOr { and, left, right } => Self::fold(
                session,
                Expression::AndOr {
                    and,
                    left: Box::new(left.optimize(session)?),
                    right: Box::new(right.optimize(session)?),
                },
            ),
            Expression::Negate(inner) => {
                Self::fold(session, Expression::Negate(Box::new(inner.optimize(session)?)))
            }
            Expression::Arithmetic { op, left, right } => Self::fold(
                session,
                Expression::Arithmetic {
                    op,
                    left: Box::new(left.optimize(session)?),
                    right: Box::new(right.optimize(session)?),
                },
            ),
            Expression::Aggregate(mut agg) => {
                if let Some(arg) = agg.arg {
                    agg.arg = Some(Box::new(arg.optimize(session)?));
                }
                Ok(Expression::Aggregate(agg))
            }
            other => Ok(other),
        }
    }

    fn fold(session: &Session<'_>, expr: Expression) -> Result<Expression, ExecutorError> {
        let foldable = match &expr {
            Expression::Comparison { left, right, .. }
            | Expression::AndOr { left, right, .. }
            | Expression::Arithmetic { left, right, .. } => {
                left.is_constant() && right.is_constant()
            }
            Expression::Negate(inner) => inner.is_constant(),
            _ => false,
        };
        if foldable {
            let ctx = QueryContext::constant(session);
            Ok(Expression::Literal(expr.evaluate(&ctx)?))
        } else {
            Ok(expr)
        }
    }

    /// Bind column references through a resolver. Already-bound columns
    /// are left alone unless the second match makes an unqualified name
    /// ambiguous.
    pub fn map_columns(
        &mut self,
        resolver: &dyn ColumnResolver,
        database: &Database,
        level: u32,
    ) -> Result<(), ExecutorError> {
        match self {
            Expression::Column(col) => {
                if let Some((resolved, data_type)) =
                    resolver.resolve_column(database, col.table.as_deref(), &col.name)
                {
                    match col.resolved {
                        None => {
                            col.resolved = Some(resolved);
                            col.data_type = data_type;
                        }
                        Some(ResolvedColumn::FilterColumn { filter, .. }) => {
                            if col.table.is_none() {
                                if let ResolvedColumn::FilterColumn { filter: other, .. } = resolved
                                {
                                    if other != filter {
                                        return Err(ExecutorError::AmbiguousColumn(
                                            col.name.clone(),
                                        ));
                                    }
                                }
                            }
                        }
                        Some(ResolvedColumn::SelectIndex { .. }) => {}
                    }
                }
                Ok(())
            }
            Expression::Alias { inner, .. } => inner.map_columns(resolver, database, level),
            Expression::Negate(inner) => inner.map_columns(resolver, database, level),
            Expression::Comparison { left, right, .. }
            | Expression::AndOr { left, right, .. }
            | Expression::Arithmetic { left, right, .. } => {
                left.map_columns(resolver, database, level)?;
                right.map_columns(resolver, database, level)
            }
            Expression::Aggregate(agg) => match &mut agg.arg {
                Some(arg) => arg.map_columns(resolver, database, level),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Mark column references of `filter` as (not) evaluatable at the
    /// current point of the join order.
    pub fn set_evaluatable(&mut self, filter: usize, evaluatable: bool) {
        match self {
            Expression::Column(col) => {
                if let Some(ResolvedColumn::FilterColumn { filter: f, .. }) = col.resolved {
                    if f == filter {
                        col.evaluatable = evaluatable;
                    }
                }
            }
            Expression::Alias { inner, .. } => inner.set_evaluatable(filter, evaluatable),
            Expression::Negate(inner) => inner.set_evaluatable(filter, evaluatable),
            Expression::Comparison { left, right, .. }
            | Expression::AndOr { left, right, .. }
            | Expression::Arithmetic { left, right, .. } => {
                left.set_evaluatable(filter, evaluatable);
                right.set_evaluatable(filter, evaluatable);
            }
            Expression::Aggregate(agg) => {
                if let Some(arg) = &mut agg.arg {
                    arg.set_evaluatable(filter, evaluatable);
                }
            }
            _ => {}
        }
    }

    /// Number aggregates in encounter order; ids key group-state slots.
    pub fn assign_aggregate_ids(&mut self, next: &mut usize) {
        match self {
            Expression::Aggregate(agg) => {
                agg.id = *next;
                *next += 1;
                if let Some(arg) = &mut agg.arg {
                    arg.assign_aggregate_ids(next);
                }
            }
            Expression::Alias { inner, .. } => inner.assign_aggregate_ids(next),
            Expression::Negate(inner) => inner.assign_aggregate_ids(next),
            Expression::Comparison { left, right, .. }
            | Expression::AndOr { left, right, .. }
            | Expression::Arithmetic { left, right, .. } => {
                left.assign_aggregate_ids(next);
                right.assign_aggregate_ids(next);
            }
            _ => {}
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expression::Aggregate(_) => true,
            Expression::Alias { inner, .. } => inner.contains_aggregate(),
            Expression::Negate(inner) => inner.contains_aggregate(),
            Expression::Comparison { left, right, .. }
            | Expression::AndOr { left, right, .. }
            | Expression::Arithmetic { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            _ => false,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Expression::Wildcard { .. })
    }

    /// Strip alias wrappers.
    pub fn non_alias(&self) -> &Expression {
        match self {
            Expression::Alias { inner, .. } => inner.non_alias(),
            other => other,
        }
    }

    pub fn is_constant(&self) -> bool {
        match self {
            Expression::Literal(_) => true,
            Expression::Alias { inner, .. } => inner.is_constant(),
            Expression::Negate(inner) => inner.is_constant(),
            _ => false,
        }
    }

    /// SQL text of the expression, used for match-by-text binding and the
    /// plan printer.
    pub fn sql_text(&self) -> String {
        match self {
            Expression::Literal(value) => value.to_string(),
            Expression::Parameter { index } => format!("?{}", index + 1),
            Expression::Column(col) => match &col.table {
                Some(table) => format!("{}.{}", table, col.name),
                None => col.name.clone(),
            },
            Expression::Wildcard { table } => match table {
                Some(table) => format!("{}.*", table),
                None => "*".to_string(),
            },
            Expression::Alias { name, inner, .. } => format!("{} AS {}", inner.sql_text(), name),
            Expression::Comparison { op, left, right } => {
                format!("({} {} {})", left.sql_text(), op.symbol(), right.sql_text())
            }
            Expression::AndOr { and, left, right } => format!(
                "({} {} {})",
                left.sql_text(),
                if *and { "AND" } else { "OR" },
                right.sql_text()
            ),
            Expression::Negate(inner) => format!("(NOT {})", inner.sql_text()),
            Expression::Arithmetic { op, left, right } => {
                format!("({} {} {})", left.sql_text(), op.symbol(), right.sql_text())
            }
            Expression::Aggregate(agg) => agg.sql_text(),
        }
    }

    /// The output column name this expression proposes: an explicit alias,
    /// a column's own name, or its SQL text.
    pub fn alias_or_derived_name(&self) -> String {
        match self {
            Expression::Alias { name, .. } => name.clone(),
            Expression::Column(col) => col.name.clone(),
            other => un_enclose(&other.sql_text()).to_string(),
        }
    }

    /// Test a property over the whole tree, short-circuiting on failure.
    pub fn is_everything(&self, visitor: &mut ExpressionVisitor<'_>) -> bool {
        match self {
            Expression::Literal(_) | Expression::Parameter { .. } => true,
            Expression::Wildcard { .. } => false,
            Expression::Column(col) => match visitor {
                ExpressionVisitor::Evaluatable => col.evaluatable,
                ExpressionVisitor::QueryComparable => col.data_type.is_comparable(),
                ExpressionVisitor::Independent => false,
                ExpressionVisitor::OptimizableAggregate { .. } => false,
                _ => true,
            },
            Expression::Alias { inner, .. } => inner.is_everything(visitor),
            Expression::Negate(inner) => inner.is_everything(visitor),
            Expression::Comparison { left, right, .. }
            | Expression::AndOr { left, right, .. }
            | Expression::Arithmetic { left, right, .. } => {
                left.is_everything(visitor) && right.is_everything(visitor)
            }
            Expression::Aggregate(agg) => match visitor {
                ExpressionVisitor::OptimizableAggregate { table } => agg.is_direct_lookup(table),
                _ => match &agg.arg {
                    Some(arg) => arg.is_everything(visitor),
                    None => true,
                },
            },
        }
    }

    /// Collect index conditions this predicate implies for `filter`:
    /// comparisons between one of the filter's columns and something
    /// evaluatable without it.
    pub fn create_index_conditions(&self, filter: usize, conditions: &mut Vec<IndexCondition>) {
        match self {
            Expression::AndOr { and: true, left, right } => {
                left.create_index_conditions(filter, conditions);
                right.create_index_conditions(filter, conditions);
            }
            Expression::Comparison { op, left, right }
                if !matches!(op, ComparisonOp::NotEqual | ComparisonOp::EqualNullSafe) =>
            {
                if let Some(column) = left.non_alias().as_filter_column(filter) {
                    if !right.references_filter(filter) {
                        conditions.push(IndexCondition {
                            column,
                            op: *op,
                            expr: (**right).clone(),
                        });
                    }
                } else if let Some(column) = right.non_alias().as_filter_column(filter) {
                    if !left.references_filter(filter) {
                        conditions.push(IndexCondition {
                            column,
                            op: op.flip(),
                            expr: (**left).clone(),
                        });
                    }
                }
            }
            _ => {}
        }
    }

    /// This expression as a plain column of `filter`, if it is one.
    pub fn as_filter_column(&self, filter: usize) -> Option<usize> {
        match self {
            Expression::Column(col) => match col.resolved {
                Some(ResolvedColumn::FilterColumn { filter: f, column }) if f == filter => {
                    Some(column)
                }
                _ => None,
            },
            _ => None,
        }
    }

    pub fn references_filter(&self, filter: usize) -> bool {
        match self {
            Expression::Column(col) => matches!(
                col.resolved,
                Some(ResolvedColumn::FilterColumn { filter: f, .. }) if f == filter
            ),
            Expression::Alias { inner, .. } => inner.references_filter(filter),
            Expression::Negate(inner) => inner.references_filter(filter),
            Expression::Comparison { left, right, .. }
            | Expression::AndOr { left, right, .. }
            | Expression::Arithmetic { left, right, .. } => {
                left.references_filter(filter) || right.references_filter(filter)
            }
            Expression::Aggregate(agg) => {
                agg.arg.as_ref().map_or(false, |a| a.references_filter(filter))
            }
            _ => false,
        }
    }
}

/// Strip one layer of enclosing parentheses, the way derived column names
/// and plan fragments are printed.
pub(crate) fn un_enclose(sql: &str) -> &str {
    if sql.starts_with('(') && sql.ends_with(')') {
        &sql[1..sql.len() - 1]
    } else {
        sql
    }
}
