//! Common test utilities for executor tests

use opalsql_catalog::{ColumnSchema, TableSchema};
use opalsql_executor::{Select, Session, TableFilter};
use opalsql_storage::{Database, Row};
use opalsql_types::{DataType, SqlValue};

#[allow(dead_code)]
pub fn int(v: i64) -> SqlValue {
    SqlValue::Integer(v)
}

#[allow(dead_code)]
pub fn int_row(values: &[i64]) -> Vec<SqlValue> {
    values.iter().map(|&v| SqlValue::Integer(v)).collect()
}

/// CREATE TABLE t (a INT, b INT) with rows
/// (1,10),(1,20),(2,30),(2,40),(3,50).
#[allow(dead_code)]
pub fn setup_t(db: &mut Database) {
    let schema = TableSchema::new(
        "t".to_string(),
        vec![
            ColumnSchema::new("a".to_string(), DataType::Integer, false),
            ColumnSchema::new("b".to_string(), DataType::Integer, true),
        ],
    );
    db.create_table(schema).unwrap();
    for (a, b) in [(1, 10), (1, 20), (2, 30), (2, 40), (3, 50)] {
        db.insert_row("t", Row::new(vec![int(a), int(b)])).unwrap();
    }
}

/// Same table but with rows inserted out of b-order, for access-path
/// tests that must distinguish index order from insertion order.
#[allow(dead_code)]
pub fn setup_t_shuffled(db: &mut Database) {
    let schema = TableSchema::new(
        "t".to_string(),
        vec![
            ColumnSchema::new("a".to_string(), DataType::Integer, false),
            ColumnSchema::new("b".to_string(), DataType::Integer, true),
        ],
    );
    db.create_table(schema).unwrap();
    for (a, b) in [(2, 30), (1, 10), (3, 50), (1, 20), (2, 40)] {
        db.insert_row("t", Row::new(vec![int(a), int(b)])).unwrap();
    }
}

#[allow(dead_code)]
pub fn select_from_t() -> Select {
    let mut select = Select::new();
    select.add_table_filter(TableFilter::new("t", "t"), true);
    select
}

/// init + prepare + execute, fully materializing the result.
#[allow(dead_code)]
pub fn run(select: &mut Select, session: &Session<'_>) -> Vec<Vec<SqlValue>> {
    select.init(session).unwrap();
    select.prepare(session).unwrap();
    run_prepared(select, session)
}

#[allow(dead_code)]
pub fn run_prepared(select: &Select, session: &Session<'_>) -> Vec<Vec<SqlValue>> {
    match select.query_without_cache(session, 0, None).unwrap() {
        Some(result) => result.into_rows().unwrap(),
        None => Vec::new(),
    }
}
