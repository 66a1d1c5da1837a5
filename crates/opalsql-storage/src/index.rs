//! Ordered secondary indexes
//!
//! Entries are `(composite key, row id)` pairs kept sorted under the
//! index's per-column sort specifications, so range lookups and ordered
//! scans are binary searches over a vector. Hash indexes reuse the same
//! storage but only support equality lookups; their iteration order is an
//! implementation detail the planner must not rely on.

use std::cmp::Ordering;

use opalsql_types::SqlValue;

/// Kind of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexType {
    pub unique: bool,
    pub hash: bool,
    /// The synthetic full-table scan path. Never unique, never hash.
    pub scan: bool,
}

impl IndexType {
    pub fn ordered(unique: bool) -> Self {
        IndexType { unique, hash: false, scan: false }
    }

    pub fn hash(unique: bool) -> Self {
        IndexType { unique, hash: true, scan: false }
    }

    pub fn is_scan(&self) -> bool {
        self.scan
    }

    pub fn is_hash(&self) -> bool {
        self.hash
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

/// One column of an index, with its sort specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexColumn {
    /// Column position in the table schema.
    pub column: usize,
    pub descending: bool,
    /// NULL position. The default keeps NULLs at the low end of the
    /// direction (first for ascending, last for descending).
    pub nulls_last: bool,
}

impl IndexColumn {
    pub fn ascending(column: usize) -> Self {
        IndexColumn { column, descending: false, nulls_last: false }
    }

    pub fn descending(column: usize) -> Self {
        IndexColumn { column, descending: true, nulls_last: true }
    }
}

/// A secondary index over a table.
#[derive(Debug, Clone)]
pub struct Index {
    pub name: String,
    pub columns: Vec<IndexColumn>,
    pub index_type: IndexType,
    entries: Vec<(Vec<SqlValue>, usize)>,
}

impl Index {
    pub fn new(name: String, columns: Vec<IndexColumn>, index_type: IndexType) -> Self {
        Index { name, columns, index_type, entries: Vec::new() }
    }

    /// Column positions covered by this index, leading column first.
    pub fn column_positions(&self) -> Vec<usize> {
        self.columns.iter().map(|c| c.column).collect()
    }

    pub fn first_column(&self) -> usize {
        self.columns[0].column
    }

    /// Whether `find_next` is usable; hash indexes cannot scan in order.
    pub fn can_find_next(&self) -> bool {
        !self.index_type.is_hash()
    }

    /// SQL that would recreate this index, or None for the scan path.
    pub fn create_sql(&self, table: &str, column_names: &[String]) -> Option<String> {
        if self.index_type.is_scan() {
            return None;
        }
        let mut sql = String::from("CREATE ");
        if self.index_type.is_unique() {
            sql.push_str("UNIQUE ");
        }
        if self.index_type.is_hash() {
            sql.push_str("HASH ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.name);
        sql.push_str(" ON ");
        sql.push_str(table);
        sql.push('(');
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&column_names[col.column]);
            if col.descending {
                sql.push_str(" DESC");
            }
        }
        sql.push(')');
        Some(sql)
    }

    /// Compare two full keys under the per-column sort specs. Equal keys
    /// fall back to row id so insertion stays deterministic.
    fn compare_entries(&self, a: &(Vec<SqlValue>, usize), b: &(Vec<SqlValue>, usize)) -> Ordering {
        match self.compare_prefix(&a.0, &b.0) {
            Ordering::Equal => a.1.cmp(&b.1),
            other => other,
        }
    }

    /// Compare a key against a (possibly shorter) bound, using only the
    /// bound's columns.
    pub fn compare_prefix(&self, key: &[SqlValue], bound: &[SqlValue]) -> Ordering {
        for (i, b) in bound.iter().enumerate() {
            let spec = &self.columns[i];
            let k = &key[i];
            let ord = match (k.is_null(), b.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => {
                    if spec.nulls_last {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    }
                }
                (false, true) => {
                    if spec.nulls_last {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    }
                }
                (false, false) => {
                    let ord = k.cmp(b);
                    if spec.descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Insert a row's key. The caller extracts the key values in index
    /// column order.
    pub fn insert(&mut self, key: Vec<SqlValue>, row_id: usize) {
        let entry = (key, row_id);
        let pos = self.entries.partition_point(|e| self.compare_entries(e, &entry) == Ordering::Less);
        self.entries.insert(pos, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot cursor over `[lower, upper]` (both inclusive, both
    /// optional, both may be key prefixes).
    pub fn cursor(&self, lower: Option<&[SqlValue]>, upper: Option<&[SqlValue]>) -> Cursor {
        let start = match lower {
            Some(bound) => self
                .entries
                .partition_point(|e| self.compare_prefix(&e.0, bound) == Ordering::Less),
            None => 0,
        };
        let end = match upper {
            Some(bound) => self
                .entries
                .partition_point(|e| self.compare_prefix(&e.0, bound) != Ordering::Greater),
            None => self.entries.len(),
        };
        let row_ids = if start < end {
            self.entries[start..end].iter().map(|(_, id)| *id).collect()
        } else {
            Vec::new()
        };
        Cursor::new(row_ids)
    }

    /// First entry in index order.
    pub fn first(&self) -> Option<(&[SqlValue], usize)> {
        self.entries.first().map(|(key, id)| (key.as_slice(), *id))
    }

    /// First entry whose key is strictly greater than `from`, in index
    /// order. This is the seek primitive of the distinct single-column
    /// scan.
    pub fn find_next(&self, from: &[SqlValue]) -> Option<(&[SqlValue], usize)> {
        let pos = self
            .entries
            .partition_point(|e| self.compare_prefix(&e.0, from) != Ordering::Greater);
        self.entries.get(pos).map(|(key, id)| (key.as_slice(), *id))
    }

    /// Smallest non-NULL value of the leading column, for MIN direct
    /// lookup.
    pub fn min_value(&self) -> Option<SqlValue> {
        self.entries
            .iter()
            .map(|(key, _)| &key[0])
            .filter(|v| !v.is_null())
            .min_by(|a, b| a.cmp(b))
            .cloned()
    }

    /// Largest non-NULL value of the leading column, for MAX direct
    /// lookup.
    pub fn max_value(&self) -> Option<SqlValue> {
        self.entries
            .iter()
            .map(|(key, _)| &key[0])
            .filter(|v| !v.is_null())
            .max_by(|a, b| a.cmp(b))
            .cloned()
    }
}

/// Snapshot iterator of row ids in index order.
#[derive(Debug, Clone)]
pub struct Cursor {
    row_ids: Vec<usize>,
    pos: usize,
}

impl Cursor {
    pub fn new(row_ids: Vec<usize>) -> Self {
        Cursor { row_ids, pos: 0 }
    }

    pub fn next(&mut self) -> Option<usize> {
        let id = self.row_ids.get(self.pos).copied();
        if id.is_some() {
            self.pos += 1;
        }
        id
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }

    pub fn remaining(&self) -> usize {
        self.row_ids.len() - self.pos
    }
}
