mod common;

use common::{int, int_row, run, select_from_t, setup_t};
use opalsql_executor::{
    AggregateKind, ComparisonOp, Expression, ExecutorError, Select, SelectOrderBy, Session,
};
use opalsql_storage::Database;
use opalsql_types::SqlValue;

fn sum_b() -> Expression {
    Expression::aggregate(AggregateKind::Sum, Some(Expression::column("b")), false)
}

#[test]
fn test_select_all() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_wildcard();
    let rows = run(&mut select, &session);
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0], int_row(&[1, 10]));
    assert_eq!(rows[4], int_row(&[3, 50]));
}

#[test]
fn test_where_filter() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), Expression::column("b")]);
    select.add_condition(Expression::comparison(
        ComparisonOp::Greater,
        Expression::column("b"),
        Expression::integer(30),
    ));
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![int_row(&[2, 40]), int_row(&[3, 50])]);
}

#[test]
fn test_not_condition() {
    // SELECT a, b FROM t WHERE NOT (b > 20)
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), Expression::column("b")]);
    select.add_condition(Expression::not(Expression::comparison(
        ComparisonOp::Greater,
        Expression::column("b"),
        Expression::integer(20),
    )));
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![int_row(&[1, 10]), int_row(&[1, 20])]);
}

#[test]
fn test_not_of_unknown_stays_unknown() {
    // b = NULL is unknown for every row, and NOT unknown is still
    // unknown, so the filter drops everything
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.add_condition(Expression::not(Expression::comparison(
        ComparisonOp::Equal,
        Expression::column("b"),
        Expression::literal(SqlValue::Null),
    )));
    let rows = run(&mut select, &session);
    assert!(rows.is_empty());
}

#[test]
fn test_not_constant_folds_away() {
    // WHERE NOT FALSE accepts every row
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.add_condition(Expression::not(Expression::literal(SqlValue::Boolean(false))));
    let rows = run(&mut select, &session);
    assert_eq!(rows.len(), 5);
}

#[test]
fn test_group_by_with_sum() {
    // SELECT a, SUM(b) FROM t GROUP BY a ORDER BY a
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), sum_b()]);
    select.set_group_by(vec![Expression::column("a")]);
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("a"))]);
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![int_row(&[1, 30]), int_row(&[2, 70]), int_row(&[3, 50])]);
}

#[test]
fn test_group_by_with_having() {
    // SELECT a, SUM(b) FROM t GROUP BY a HAVING SUM(b) > 40 ORDER BY a
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), sum_b()]);
    select.set_group_by(vec![Expression::column("a")]);
    select.set_having(Expression::comparison(
        ComparisonOp::Greater,
        sum_b(),
        Expression::integer(40),
    ));
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("a"))]);
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![int_row(&[2, 70]), int_row(&[3, 50])]);
}

#[test]
fn test_group_by_alias() {
    // SELECT a AS k, SUM(b) FROM t GROUP BY k ORDER BY k
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::alias("k", Expression::column("a")), sum_b()]);
    select.set_group_by(vec![Expression::column("k")]);
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("k"))]);
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![int_row(&[1, 30]), int_row(&[2, 70]), int_row(&[3, 50])]);
}

#[test]
fn test_aggregates_over_empty_scan() {
    // a WHERE clause defeats the direct-lookup path, so this exercises
    // hashed grouping over zero input rows: still exactly one row
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::count_star(), sum_b()]);
    select.add_condition(Expression::comparison(
        ComparisonOp::Greater,
        Expression::column("b"),
        Expression::integer(1000),
    ));
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![vec![int(0), SqlValue::Null]]);
}

#[test]
fn test_distinct() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.set_distinct().unwrap();
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("a"))]);
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![int_row(&[1]), int_row(&[2]), int_row(&[3])]);
}

#[test]
fn test_distinct_on_keeps_first_row_per_key() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), Expression::column("b")]);
    select.set_distinct_on(vec![Expression::column("a")]).unwrap();
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![int_row(&[1, 10]), int_row(&[2, 30]), int_row(&[3, 50])]);
}

#[test]
fn test_distinct_on_with_distinct_is_rejected() {
    let mut select = Select::new();
    select.set_distinct().unwrap();
    assert!(matches!(
        select.set_distinct_on(vec![Expression::column("a")]),
        Err(ExecutorError::UnsupportedFeature(_))
    ));
}

#[test]
fn test_order_by_position_and_desc() {
    // SELECT a, b FROM t ORDER BY 2 DESC
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), Expression::column("b")]);
    select.set_order_by(vec![SelectOrderBy::new(Expression::integer(2)).descending()]);
    let rows = run(&mut select, &session);
    assert_eq!(rows[0], int_row(&[3, 50]));
    assert_eq!(rows[4], int_row(&[1, 10]));
}

#[test]
fn test_order_by_invalid_position() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.set_order_by(vec![SelectOrderBy::new(Expression::integer(7))]);
    let err = select.init(&session).unwrap_err();
    assert!(matches!(err, ExecutorError::InvalidValue { .. }));
}

#[test]
fn test_order_by_non_selected_column() {
    // SELECT a FROM t ORDER BY b DESC: b is appended to the expression
    // list but must not appear in the output
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("b")).descending()]);
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![int_row(&[3]), int_row(&[2]), int_row(&[2]), int_row(&[1]), int_row(&[1])]);
}

#[test]
fn test_limit_offset() {
    // SELECT a, b FROM t ORDER BY b DESC LIMIT 2 OFFSET 1
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), Expression::column("b")]);
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("b")).descending()]);
    select.set_limit(Expression::integer(2));
    select.set_offset(Expression::integer(1));
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![int_row(&[2, 40]), int_row(&[2, 30])]);
}

#[test]
fn test_offset_limit_composition() {
    // OFFSET o LIMIT l == drop o from LIMIT o+l
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    for (o, l) in [(0i64, 2i64), (1, 2), (2, 2), (4, 3)] {
        let mut with_offset = select_from_t();
        with_offset.set_expressions(vec![Expression::column("b")]);
        with_offset.set_order_by(vec![SelectOrderBy::new(Expression::column("b"))]);
        with_offset.set_limit(Expression::integer(l));
        with_offset.set_offset(Expression::integer(o));
        let offset_rows = run(&mut with_offset, &session);

        let mut combined = select_from_t();
        combined.set_expressions(vec![Expression::column("b")]);
        combined.set_order_by(vec![SelectOrderBy::new(Expression::column("b"))]);
        combined.set_limit(Expression::integer(o + l));
        let mut combined_rows = run(&mut combined, &session);
        combined_rows.drain(..(o as usize).min(combined_rows.len()));

        assert_eq!(offset_rows, combined_rows, "offset {} limit {}", o, l);
    }
}

#[test]
fn test_with_ties() {
    // SELECT a, b FROM t ORDER BY b FETCH FIRST 2 ROWS WITH TIES, after
    // adding a row that ties on b = 20
    let mut db = Database::new();
    setup_t(&mut db);
    db.insert_row("t", opalsql_storage::Row::new(vec![int(4), int(20)])).unwrap();
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), Expression::column("b")]);
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("b"))]);
    select.set_limit(Expression::integer(2));
    select.set_with_ties(true);
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![int_row(&[1, 10]), int_row(&[1, 20]), int_row(&[4, 20])]);
}

#[test]
fn test_with_ties_requires_order_by() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.set_limit(Expression::integer(2));
    select.set_with_ties(true);
    assert_eq!(select.init(&session).unwrap_err(), ExecutorError::WithTiesWithoutOrderBy);
}

#[test]
fn test_fetch_percent() {
    // 40 percent of 5 rows rounds up to 2
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("b")]);
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("b"))]);
    select.set_limit(Expression::integer(40));
    select.set_fetch_percent(true);
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![int_row(&[10]), int_row(&[20])]);
}

#[test]
fn test_fetch_percent_out_of_range() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("b")]);
    select.set_limit(Expression::integer(200));
    select.set_fetch_percent(true);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    let err = select.query_without_cache(&session, 0, None).unwrap_err();
    assert!(matches!(err, ExecutorError::InvalidValue { .. }));
}

#[test]
fn test_fetch_zero_percent_is_empty() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("b")]);
    select.set_limit(Expression::integer(0));
    select.set_fetch_percent(true);
    let rows = run(&mut select, &session);
    assert!(rows.is_empty());
}

#[test]
fn test_limit_null_means_unlimited() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.set_limit(Expression::literal(SqlValue::Null));
    let rows = run(&mut select, &session);
    assert_eq!(rows.len(), 5);
}

#[test]
fn test_max_rows_combines_with_limit() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.set_limit(Expression::integer(4));
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    let result = select.query_without_cache(&session, 3, None).unwrap().unwrap();
    assert_eq!(result.into_rows().unwrap().len(), 3);
}

#[test]
fn test_double_init_is_internal_error() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.init(&session).unwrap();
    assert!(matches!(select.init(&session), Err(ExecutorError::Internal(_))));
}

#[test]
fn test_prepare_before_init_is_internal_error() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    assert!(matches!(select.prepare(&session), Err(ExecutorError::Internal(_))));
}

#[test]
fn test_prepare_twice_is_noop() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    select.prepare(&session).unwrap();
    assert_eq!(common::run_prepared(&select, &session).len(), 5);
}

#[test]
fn test_qualified_wildcard_unknown_alias() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::qualified_wildcard("missing")]);
    assert_eq!(
        select.init(&session).unwrap_err(),
        ExecutorError::TableNotFound("missing".to_string())
    );
}

#[test]
fn test_unknown_column_fails_in_prepare() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("zzz")]);
    select.init(&session).unwrap();
    assert_eq!(
        select.prepare(&session).unwrap_err(),
        ExecutorError::ColumnNotFound("zzz".to_string())
    );
}

#[test]
fn test_query_meta_is_empty_with_columns() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![
        Expression::alias("first", Expression::column("a")),
        Expression::column("b"),
    ]);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    let mut meta = select.query_meta().unwrap();
    assert_eq!(meta.column_names(), &["first".to_string(), "b".to_string()]);
    assert!(!meta.next());
}

#[test]
fn test_column_invariants_after_prepare() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), sum_b()]);
    select.set_group_by(vec![Expression::column("a")]);
    select.set_having(Expression::comparison(
        ComparisonOp::Greater,
        sum_b(),
        Expression::integer(0),
    ));
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("b"))]);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    // visible <= distinct <= expression count; every produced row has
    // the visible arity
    assert_eq!(select.get_column_count(), 2);
    let rows = common::run_prepared(&select, &session);
    for row in &rows {
        assert_eq!(row.len(), 2);
    }
}

#[test]
fn test_global_condition_on_group_key_joins_where() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), sum_b()]);
    select.set_group_by(vec![Expression::column("a")]);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    select
        .add_global_condition(&session, 0, 0, ComparisonOp::Equal)
        .unwrap();
    session.set_parameter(0, int(2));
    let rows = common::run_prepared(&select, &session);
    assert_eq!(rows, vec![int_row(&[2, 70])]);
    assert!(select.get_plan_sql(&db).contains("WHERE"));
}

#[test]
fn test_global_condition_on_aggregate_joins_having() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), sum_b()]);
    select.set_group_by(vec![Expression::column("a")]);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    select
        .add_global_condition(&session, 0, 1, ComparisonOp::Greater)
        .unwrap();
    // the reconstructed HAVING is plan-visible; repeated injection must
    // extend it instead of re-registering
    select
        .add_global_condition(&session, 1, 1, ComparisonOp::Less)
        .unwrap();
    let plan = select.get_plan_sql(&db);
    assert!(plan.contains("HAVING"));
    assert!(plan.contains("?1"));
    assert!(plan.contains("?2"));
}

#[test]
fn test_sample_size_caps_scanned_rows() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.set_sample_size(Expression::integer(2));
    let rows = run(&mut select, &session);
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_cancellation_between_rows() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    session.cancel();
    let err = select.query_without_cache(&session, 0, None).unwrap_err();
    assert_eq!(err, ExecutorError::QueryCanceled);
}

struct RowSink {
    rows: Vec<Vec<SqlValue>>,
    limits_applied: bool,
}

impl opalsql_executor::ResultTarget for RowSink {
    fn add_row(&mut self, row: Vec<SqlValue>) -> Result<(), ExecutorError> {
        self.rows.push(row);
        Ok(())
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn limits_were_applied(&mut self) {
        self.limits_applied = true;
    }
}

#[test]
fn test_drain_into_target() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("a")).descending()]);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    let mut sink = RowSink { rows: Vec::new(), limits_applied: false };
    let outcome = select.query_without_cache(&session, 0, Some(&mut sink)).unwrap();
    assert!(outcome.is_none());
    assert_eq!(sink.rows.len(), 5);
    assert_eq!(sink.rows[0], int_row(&[3]));
    for row in &sink.rows {
        assert_eq!(row.len(), 1);
    }
}

#[test]
fn test_before_select_triggers_fire_per_filter() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let select = {
        let mut select = select_from_t();
        select.set_expressions(vec![Expression::column("a")]);
        select.init(&session).unwrap();
        select.prepare(&session).unwrap();
        select
    };
    select.fire_before_select_triggers(&db).unwrap();
    select.fire_before_select_triggers(&db).unwrap();
    assert_eq!(db.get_table("t").unwrap().select_trigger_fires(), 2);
}
