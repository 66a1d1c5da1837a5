mod common;

use common::{int, int_row, run, run_prepared, select_from_t, setup_t, setup_t_shuffled};
use opalsql_catalog::{ColumnSchema, TableSchema};
use opalsql_executor::{
    AggregateKind, ComparisonOp, Expression, Select, SelectOrderBy, Session, TableFilter,
};
use opalsql_storage::{Database, Row};
use opalsql_types::{DataType, SqlValue};

#[test]
fn test_count_star_direct_lookup() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::count_star()]);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    assert!(select.is_quick_aggregate_query());
    assert!(select.get_plan_sql(&db).contains("/* direct lookup */"));
    assert_eq!(run_prepared(&select, &session), vec![int_row(&[5])]);
}

#[test]
fn test_min_max_direct_lookup_needs_index() {
    let mut db = Database::new();
    setup_t(&mut db);
    db.get_table_mut("t").unwrap().create_index("idx_b", &["b"], false).unwrap();
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![
        Expression::aggregate(AggregateKind::Min, Some(Expression::column("b")), false),
        Expression::aggregate(AggregateKind::Max, Some(Expression::column("b")), false),
        Expression::count_star(),
    ]);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    assert!(select.is_quick_aggregate_query());
    assert_eq!(run_prepared(&select, &session), vec![int_row(&[10, 50, 5])]);
}

#[test]
fn test_min_without_index_scans() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::aggregate(
        AggregateKind::Min,
        Some(Expression::column("b")),
        false,
    )]);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    assert!(!select.is_quick_aggregate_query());
    assert_eq!(run_prepared(&select, &session), vec![int_row(&[10])]);
}

#[test]
fn test_where_defeats_direct_lookup() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::count_star()]);
    select.add_condition(Expression::comparison(
        ComparisonOp::Greater,
        Expression::column("b"),
        Expression::integer(20),
    ));
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    assert!(!select.is_quick_aggregate_query());
    assert_eq!(run_prepared(&select, &session), vec![int_row(&[3])]);
}

#[test]
fn test_order_by_uses_index() {
    let mut db = Database::new();
    setup_t_shuffled(&mut db);
    db.get_table_mut("t").unwrap().create_index("idx_b", &["b"], false).unwrap();
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), Expression::column("b")]);
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("b"))]);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    assert!(select.get_plan_sql(&db).contains("/* index sorted */"));
    let rows = run_prepared(&select, &session);
    assert_eq!(
        rows,
        vec![
            int_row(&[1, 10]),
            int_row(&[1, 20]),
            int_row(&[2, 30]),
            int_row(&[2, 40]),
            int_row(&[3, 50]),
        ]
    );
}

#[test]
fn test_order_by_desc_does_not_use_ascending_index() {
    let mut db = Database::new();
    setup_t_shuffled(&mut db);
    db.get_table_mut("t").unwrap().create_index("idx_b", &["b"], false).unwrap();
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("b")]);
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("b")).descending()]);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    assert!(!select.get_plan_sql(&db).contains("/* index sorted */"));
    let rows = run_prepared(&select, &session);
    assert_eq!(rows[0], int_row(&[50]));
    assert_eq!(rows[4], int_row(&[10]));
}

#[test]
fn test_order_by_elision_with_limit_stops_early() {
    let mut db = Database::new();
    setup_t_shuffled(&mut db);
    db.get_table_mut("t").unwrap().create_index("idx_b", &["b"], false).unwrap();
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("b")]);
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("b"))]);
    select.set_limit(Expression::integer(2));
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    assert_eq!(run_prepared(&select, &session), vec![int_row(&[10]), int_row(&[20])]);
}

#[test]
fn test_group_sorted_matches_hashed_grouping() {
    let mut db = Database::new();
    setup_t_shuffled(&mut db);
    db.get_table_mut("t").unwrap().create_index("idx_a", &["a"], false).unwrap();
    let session = Session::new(&db);

    let mut sorted = select_from_t();
    sorted.set_expressions(vec![
        Expression::column("a"),
        Expression::aggregate(AggregateKind::Sum, Some(Expression::column("b")), false),
    ]);
    sorted.set_group_by(vec![Expression::column("a")]);
    sorted.init(&session).unwrap();
    sorted.prepare(&session).unwrap();
    assert!(sorted.get_plan_sql(&db).contains("/* group sorted */"));
    let mut sorted_rows = run_prepared(&sorted, &session);
    sorted_rows.sort();

    // hashed variant: same query against a table without the index
    let mut db2 = Database::new();
    setup_t_shuffled(&mut db2);
    let session2 = Session::new(&db2);
    let mut hashed = select_from_t();
    hashed.set_expressions(vec![
        Expression::column("a"),
        Expression::aggregate(AggregateKind::Sum, Some(Expression::column("b")), false),
    ]);
    hashed.set_group_by(vec![Expression::column("a")]);
    let mut hashed_rows = run(&mut hashed, &session2);
    hashed_rows.sort();

    assert_eq!(sorted_rows, hashed_rows);
    assert_eq!(sorted_rows.len(), 3);
}

#[test]
fn test_group_sorted_with_having() {
    let mut db = Database::new();
    setup_t(&mut db);
    db.get_table_mut("t").unwrap().create_index("idx_a", &["a"], false).unwrap();
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![
        Expression::column("a"),
        Expression::aggregate(AggregateKind::Sum, Some(Expression::column("b")), false),
    ]);
    select.set_group_by(vec![Expression::column("a")]);
    select.set_having(Expression::comparison(
        ComparisonOp::Greater,
        Expression::aggregate(AggregateKind::Sum, Some(Expression::column("b")), false),
        Expression::integer(40),
    ));
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    assert!(select.get_plan_sql(&db).contains("/* group sorted */"));
    assert_eq!(run_prepared(&select, &session), vec![int_row(&[2, 70]), int_row(&[3, 50])]);
}

#[test]
fn test_group_by_prefix_of_two_column_index() {
    // index (a, b) serves GROUP BY a; index (a, b) does not serve
    // GROUP BY b
    let mut db = Database::new();
    setup_t(&mut db);
    db.get_table_mut("t").unwrap().create_index("idx_ab", &["a", "b"], false).unwrap();
    let session = Session::new(&db);

    let mut by_a = select_from_t();
    by_a.set_expressions(vec![Expression::column("a"), Expression::count_star()]);
    by_a.set_group_by(vec![Expression::column("a")]);
    by_a.init(&session).unwrap();
    by_a.prepare(&session).unwrap();
    assert!(by_a.get_plan_sql(&db).contains("/* group sorted */"));

    let mut by_b = select_from_t();
    by_b.set_expressions(vec![Expression::column("b"), Expression::count_star()]);
    by_b.set_group_by(vec![Expression::column("b")]);
    by_b.init(&session).unwrap();
    by_b.prepare(&session).unwrap();
    assert!(!by_b.get_plan_sql(&db).contains("/* group sorted */"));
}

#[test]
fn test_distinct_index_scan() {
    let mut db = Database::new();
    let schema = TableSchema::new(
        "d".to_string(),
        vec![
            ColumnSchema::new("a".to_string(), DataType::Integer, false).with_selectivity(10),
            ColumnSchema::new("b".to_string(), DataType::Integer, true),
        ],
    );
    db.create_table(schema).unwrap();
    for (a, b) in [(2, 1), (1, 2), (2, 3), (3, 4), (1, 5)] {
        db.insert_row("d", Row::new(vec![int(a), int(b)])).unwrap();
    }
    db.get_table_mut("d").unwrap().create_index("idx_da", &["a"], false).unwrap();
    let session = Session::new(&db);

    let mut select = Select::new();
    select.add_table_filter(TableFilter::new("d", "d"), true);
    select.set_expressions(vec![Expression::column("a")]);
    select.set_distinct().unwrap();
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    assert!(select.get_plan_sql(&db).contains("/* distinct */"));
    assert_eq!(
        run_prepared(&select, &session),
        vec![int_row(&[1]), int_row(&[2]), int_row(&[3])]
    );
}

#[test]
fn test_distinct_scan_needs_low_selectivity() {
    let mut db = Database::new();
    setup_t(&mut db);
    db.get_table_mut("t").unwrap().create_index("idx_a", &["a"], false).unwrap();
    let session = Session::new(&db);

    // column a carries the sentinel selectivity, so the plan stays on
    // the materialized distinct path
    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.set_distinct().unwrap();
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    assert!(!select.get_plan_sql(&db).contains("/* distinct */"));
    let mut rows = run_prepared(&select, &session);
    rows.sort();
    assert_eq!(rows, vec![int_row(&[1]), int_row(&[2]), int_row(&[3])]);
}

#[test]
fn test_equality_pushdown_uses_index() {
    let mut db = Database::new();
    setup_t(&mut db);
    db.get_table_mut("t").unwrap().create_index("idx_a", &["a"], false).unwrap();
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a"), Expression::column("b")]);
    select.add_condition(Expression::comparison(
        ComparisonOp::Equal,
        Expression::column("a"),
        Expression::integer(2),
    ));
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    assert!(select.get_plan_sql(&db).contains("idx_a"));
    assert_eq!(run_prepared(&select, &session), vec![int_row(&[2, 30]), int_row(&[2, 40])]);
}

#[test]
fn test_range_pushdown() {
    let mut db = Database::new();
    setup_t(&mut db);
    db.get_table_mut("t").unwrap().create_index("idx_b", &["b"], false).unwrap();
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("b")]);
    select.add_condition(Expression::and(
        Expression::comparison(
            ComparisonOp::GreaterEqual,
            Expression::column("b"),
            Expression::integer(20),
        ),
        Expression::comparison(
            ComparisonOp::Less,
            Expression::column("b"),
            Expression::integer(50),
        ),
    ));
    let rows = run(&mut select, &session);
    assert_eq!(rows, vec![int_row(&[20]), int_row(&[30]), int_row(&[40])]);
}

#[test]
fn test_inner_join_through_where() {
    let mut db = Database::new();
    setup_t(&mut db);
    let schema = TableSchema::new(
        "u".to_string(),
        vec![
            ColumnSchema::new("x".to_string(), DataType::Integer, false),
            ColumnSchema::new("y".to_string(), DataType::Integer, true),
        ],
    );
    db.create_table(schema).unwrap();
    for (x, y) in [(1, 100), (2, 200)] {
        db.insert_row("u", Row::new(vec![int(x), int(y)])).unwrap();
    }
    let session = Session::new(&db);

    let mut select = Select::new();
    select.add_table_filter(TableFilter::new("t", "t"), true);
    select.add_table_filter(TableFilter::new("u", "u"), true);
    select.set_expressions(vec![
        Expression::qualified_column("t", "a"),
        Expression::qualified_column("u", "y"),
    ]);
    select.add_condition(Expression::comparison(
        ComparisonOp::Equal,
        Expression::qualified_column("t", "a"),
        Expression::qualified_column("u", "x"),
    ));
    let mut rows = run(&mut select, &session);
    rows.sort();
    assert_eq!(
        rows,
        vec![
            int_row(&[1, 100]),
            int_row(&[1, 100]),
            int_row(&[2, 200]),
            int_row(&[2, 200]),
        ]
    );
}

#[test]
fn test_left_outer_join_null_extends() {
    let mut db = Database::new();
    setup_t(&mut db);
    let schema = TableSchema::new(
        "u".to_string(),
        vec![
            ColumnSchema::new("x".to_string(), DataType::Integer, false),
            ColumnSchema::new("y".to_string(), DataType::Integer, true),
        ],
    );
    db.create_table(schema).unwrap();
    for (x, y) in [(1, 100), (2, 200)] {
        db.insert_row("u", Row::new(vec![int(x), int(y)])).unwrap();
    }
    let session = Session::new(&db);

    let mut select = Select::new();
    select.add_table_filter(TableFilter::new("t", "t"), true);
    let mut right = TableFilter::new("u", "u");
    right.joined_outer = true;
    right.join_condition = Some(Expression::comparison(
        ComparisonOp::Equal,
        Expression::qualified_column("t", "a"),
        Expression::qualified_column("u", "x"),
    ));
    select.add_table_filter(right, true);
    select.set_expressions(vec![
        Expression::qualified_column("t", "a"),
        Expression::qualified_column("u", "y"),
    ]);
    let rows = run(&mut select, &session);
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[4], vec![int(3), SqlValue::Null]);
}

#[test]
fn test_plan_sql_shape() {
    let mut db = Database::new();
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![
        Expression::column("a"),
        Expression::aggregate(AggregateKind::Sum, Some(Expression::column("b")), false),
    ]);
    select.set_group_by(vec![Expression::column("a")]);
    select.set_having(Expression::comparison(
        ComparisonOp::Greater,
        Expression::aggregate(AggregateKind::Sum, Some(Expression::column("b")), false),
        Expression::integer(40),
    ));
    select.set_order_by(vec![SelectOrderBy::new(Expression::column("a"))]);
    select.set_limit(Expression::integer(10));
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    let plan = select.get_plan_sql(&db);
    assert!(plan.starts_with("SELECT"));
    assert!(plan.contains("\nFROM t"));
    assert!(plan.contains("GROUP BY a"));
    assert!(plan.contains("HAVING SUM(b) > 40"));
    assert!(plan.contains("ORDER BY 1"));
    assert!(plan.contains("FETCH FIRST 10 ROWS ONLY"));
}

#[test]
fn test_for_update_plan_sql() {
    let mut db = Database::with_settings(opalsql_storage::DatabaseSettings {
        select_for_update_mvcc: false,
        ..Default::default()
    });
    setup_t(&mut db);
    let session = Session::new(&db);

    let mut select = select_from_t();
    select.set_expressions(vec![Expression::column("a")]);
    select.set_for_update(true, &db);
    select.init(&session).unwrap();
    select.prepare(&session).unwrap();
    assert!(select.get_plan_sql(&db).contains("\nFOR UPDATE"));
}
