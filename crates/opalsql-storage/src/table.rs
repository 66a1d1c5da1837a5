//! In-memory tables
//!
//! Rows live in a vector in insertion order; the row's position is its row
//! id. Secondary indexes are maintained on insert. Deletion is not part of
//! this engine's surface, so row ids are stable.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use opalsql_catalog::TableSchema;
use opalsql_types::SqlValue;

use crate::error::StorageError;
use crate::index::{Cursor, Index, IndexColumn, IndexType};
use crate::row::Row;

#[derive(Debug)]
pub struct Table {
    pub schema: TableSchema,
    rows: Vec<Row>,
    indexes: Vec<Index>,
    data_modification_id: u64,
    select_trigger_fires: AtomicU64,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        let mut table = Table {
            schema,
            rows: Vec::new(),
            indexes: Vec::new(),
            data_modification_id: 0,
            select_trigger_fires: AtomicU64::new(0),
        };
        if let Some(pk) = table.schema.primary_key.clone() {
            let name = format!("__pk_{}", table.schema.name);
            let cols: Vec<&str> = pk.iter().map(|s| s.as_str()).collect();
            // schema is trusted here; a bad primary key is a catalog bug
            table
                .create_index_of_type(&name, &cols, IndexType::ordered(true))
                .expect("primary key columns must exist");
        }
        table
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, row_id: usize) -> Option<&Row> {
        self.rows.get(row_id)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn data_modification_id(&self) -> u64 {
        self.data_modification_id
    }

    /// Base tables always produce the same rows for the same state.
    pub fn is_deterministic(&self) -> bool {
        true
    }

    /// Insert a row, maintaining all indexes.
    pub fn insert(&mut self, row: Row) -> Result<usize, StorageError> {
        if row.len() != self.schema.column_count() {
            return Err(StorageError::RowArityMismatch {
                expected: self.schema.column_count(),
                actual: row.len(),
            });
        }
        let row_id = self.rows.len();
        for index in &mut self.indexes {
            let key: Vec<SqlValue> =
                index.columns.iter().map(|c| row.values[c.column].clone()).collect();
            index.insert(key, row_id);
        }
        self.rows.push(row);
        self.data_modification_id += 1;
        Ok(row_id)
    }

    /// Create an ordered, ascending index over the named columns.
    pub fn create_index(
        &mut self,
        name: &str,
        columns: &[&str],
        unique: bool,
    ) -> Result<(), StorageError> {
        self.create_index_of_type(name, columns, IndexType::ordered(unique))
    }

    /// Create a hash index. Only equality lookups are supported on it.
    pub fn create_hash_index(
        &mut self,
        name: &str,
        columns: &[&str],
        unique: bool,
    ) -> Result<(), StorageError> {
        self.create_index_of_type(name, columns, IndexType::hash(unique))
    }

    fn create_index_of_type(
        &mut self,
        name: &str,
        columns: &[&str],
        index_type: IndexType,
    ) -> Result<(), StorageError> {
        let mut specs = Vec::with_capacity(columns.len());
        for col in columns {
            let position = self
                .schema
                .column_index(col)
                .ok_or_else(|| StorageError::ColumnNotFound((*col).to_string()))?;
            specs.push(IndexColumn::ascending(position));
        }
        self.create_index_spec(name, specs, index_type)
    }

    /// Create an index with explicit per-column sort specifications.
    pub fn create_index_spec(
        &mut self,
        name: &str,
        columns: Vec<IndexColumn>,
        index_type: IndexType,
    ) -> Result<(), StorageError> {
        if self.indexes.iter().any(|i| i.name == name) {
            return Err(StorageError::IndexAlreadyExists(name.to_string()));
        }
        let mut index = Index::new(name.to_string(), columns, index_type);
        for (row_id, row) in self.rows.iter().enumerate() {
            let key: Vec<SqlValue> =
                index.columns.iter().map(|c| row.values[c.column].clone()).collect();
            index.insert(key, row_id);
        }
        self.indexes.push(index);
        Ok(())
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn index(&self, position: usize) -> Option<&Index> {
        self.indexes.get(position)
    }

    pub fn index_by_name(&self, name: &str) -> Option<(usize, &Index)> {
        self.indexes.iter().enumerate().find(|(_, i)| i.name == name)
    }

    /// Cursor over all rows in insertion order (the scan access path).
    pub fn scan_cursor(&self) -> Cursor {
        Cursor::new((0..self.rows.len()).collect())
    }

    /// An ascending non-hash index whose leading column is `column`, for
    /// the distinct fast path and MIN/MAX lookups.
    pub fn index_for_column(&self, column: usize) -> Option<(usize, &Index)> {
        self.indexes.iter().enumerate().find(|(_, i)| {
            !i.index_type.is_hash() && i.first_column() == column && !i.columns[0].descending
        })
    }

    /// Record a before-SELECT trigger firing. Observable through
    /// [`Table::select_trigger_fires`].
    pub fn fire_before_select(&self) {
        self.select_trigger_fires.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub fn select_trigger_fires(&self) -> u64 {
        self.select_trigger_fires.load(AtomicOrdering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opalsql_catalog::ColumnSchema;
    use opalsql_types::DataType;

    fn test_table() -> Table {
        let schema = TableSchema::new(
            "t".to_string(),
            vec![
                ColumnSchema::new("a".to_string(), DataType::Integer, false),
                ColumnSchema::new("b".to_string(), DataType::Integer, true),
            ],
        );
        Table::new(schema)
    }

    #[test]
    fn test_insert_maintains_index() {
        let mut table = test_table();
        table.create_index("idx_b", &["b"], false).unwrap();
        table.insert(Row::new(vec![SqlValue::Integer(1), SqlValue::Integer(30)])).unwrap();
        table.insert(Row::new(vec![SqlValue::Integer(2), SqlValue::Integer(10)])).unwrap();
        table.insert(Row::new(vec![SqlValue::Integer(3), SqlValue::Integer(20)])).unwrap();

        let (_, index) = table.index_by_name("idx_b").unwrap();
        let mut cursor = index.cursor(None, None);
        assert_eq!(cursor.next(), Some(1));
        assert_eq!(cursor.next(), Some(2));
        assert_eq!(cursor.next(), Some(0));
    }

    #[test]
    fn test_index_created_after_rows() {
        let mut table = test_table();
        table.insert(Row::new(vec![SqlValue::Integer(2), SqlValue::Integer(5)])).unwrap();
        table.insert(Row::new(vec![SqlValue::Integer(1), SqlValue::Integer(6)])).unwrap();
        table.create_index("idx_a", &["a"], false).unwrap();
        let (_, index) = table.index_by_name("idx_a").unwrap();
        let mut cursor = index.cursor(None, None);
        assert_eq!(cursor.next(), Some(1));
        assert_eq!(cursor.next(), Some(0));
    }

    #[test]
    fn test_arity_mismatch() {
        let mut table = test_table();
        let err = table.insert(Row::new(vec![SqlValue::Integer(1)])).unwrap_err();
        assert_eq!(err, StorageError::RowArityMismatch { expected: 2, actual: 1 });
    }
}
