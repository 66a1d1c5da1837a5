//! The in-memory database: table registry, settings, lock registry
//!
//! Queries run against `&Database`; the lock registry uses interior
//! mutability because FOR UPDATE acquires locks during read-only
//! execution.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use opalsql_catalog::TableSchema;

use crate::error::StorageError;
use crate::row::Row;
use crate::table::Table;

/// Engine settings consulted by the planner and executor.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Stream INSERT ... SELECT directly into the target when possible.
    pub optimize_insert_from_select: bool,
    /// Allow the single-column DISTINCT index scan.
    pub optimize_distinct: bool,
    /// Treat subquery results as evaluatable during planning.
    pub optimize_evaluatable_subqueries: bool,
    /// Use row-level MVCC locks for SELECT ... FOR UPDATE.
    pub select_for_update_mvcc: bool,
    /// Whether the MVCC-capable store backs the tables.
    pub mv_store: bool,
    /// Compare identifiers case-insensitively.
    pub case_insensitive_identifiers: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            optimize_insert_from_select: true,
            optimize_distinct: true,
            optimize_evaluatable_subqueries: true,
            select_for_update_mvcc: true,
            mv_store: true,
            case_insensitive_identifiers: true,
        }
    }
}

#[derive(Debug, Default)]
struct TableLockState {
    shared: HashSet<u64>,
    exclusive: Option<u64>,
}

/// Table locks plus buffered MVCC row locks, keyed by session id.
#[derive(Debug, Default)]
struct LockRegistry {
    tables: Mutex<HashMap<String, TableLockState>>,
    rows: Mutex<HashMap<(String, usize), u64>>,
}

#[derive(Debug)]
pub struct Database {
    tables: HashMap<String, Table>,
    pub settings: DatabaseSettings,
    locks: LockRegistry,
}

impl Default for Database {
    fn default() -> Self {
        Database::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Database::with_settings(DatabaseSettings::default())
    }

    pub fn with_settings(settings: DatabaseSettings) -> Self {
        Database { tables: HashMap::new(), settings, locks: LockRegistry::default() }
    }

    /// Compare two identifiers under the configured case rules.
    pub fn equals_identifiers(&self, a: &str, b: &str) -> bool {
        if self.settings.case_insensitive_identifiers {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<(), StorageError> {
        let name = schema.name.clone();
        if self.tables.contains_key(&name) {
            return Err(StorageError::TableAlreadyExists(name));
        }
        self.tables.insert(name, Table::new(schema));
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        if let Some(table) = self.tables.get(name) {
            return Some(table);
        }
        if self.settings.case_insensitive_identifiers {
            self.tables.values().find(|t| t.schema.name.eq_ignore_ascii_case(name))
        } else {
            None
        }
    }

    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        if self.tables.contains_key(name) {
            return self.tables.get_mut(name);
        }
        if self.settings.case_insensitive_identifiers {
            let found = self
                .tables
                .values()
                .find(|t| t.schema.name.eq_ignore_ascii_case(name))
                .map(|t| t.schema.name.clone());
            found.and_then(move |n| self.tables.get_mut(&n))
        } else {
            None
        }
    }

    pub fn insert_row(&mut self, table: &str, row: Row) -> Result<usize, StorageError> {
        let table = self
            .get_table_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        table.insert(row)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Acquire a table lock for a session. Shared locks coexist; an
    /// exclusive lock conflicts with everything held by other sessions.
    pub fn lock_table(
        &self,
        session_id: u64,
        table: &str,
        exclusive: bool,
    ) -> Result<(), StorageError> {
        let mut tables = self.locks.tables.lock();
        let state = tables.entry(table.to_string()).or_default();
        if let Some(owner) = state.exclusive {
            if owner != session_id {
                log::warn!("session {} blocked by exclusive lock on {}", session_id, table);
                return Err(StorageError::LockConflict { table: table.to_string() });
            }
        }
        if exclusive {
            if state.shared.iter().any(|&s| s != session_id) {
                return Err(StorageError::LockConflict { table: table.to_string() });
            }
            state.exclusive = Some(session_id);
        } else {
            state.shared.insert(session_id);
        }
        Ok(())
    }

    /// Install a batch of MVCC row locks, all-or-nothing.
    pub fn lock_rows(
        &self,
        session_id: u64,
        table: &str,
        row_ids: &[usize],
    ) -> Result<(), StorageError> {
        let mut rows = self.locks.rows.lock();
        for &row_id in row_ids {
            if let Some(&owner) = rows.get(&(table.to_string(), row_id)) {
                if owner != session_id {
                    log::warn!(
                        "row lock conflict on {}:{} (held by session {})",
                        table,
                        row_id,
                        owner
                    );
                    return Err(StorageError::LockConflict { table: table.to_string() });
                }
            }
        }
        for &row_id in row_ids {
            rows.insert((table.to_string(), row_id), session_id);
        }
        Ok(())
    }

    /// Release everything a session holds, called on transaction end.
    pub fn unlock_all(&self, session_id: u64) {
        let mut tables = self.locks.tables.lock();
        for state in tables.values_mut() {
            state.shared.remove(&session_id);
            if state.exclusive == Some(session_id) {
                state.exclusive = None;
            }
        }
        let mut rows = self.locks.rows.lock();
        rows.retain(|_, owner| *owner != session_id);
    }

    /// Row ids locked by a session on a table, for tests and diagnostics.
    pub fn locked_rows(&self, session_id: u64, table: &str) -> Vec<usize> {
        let rows = self.locks.rows.lock();
        let mut ids: Vec<usize> = rows
            .iter()
            .filter(|((t, _), owner)| t == table && **owner == session_id)
            .map(|((_, row_id), _)| *row_id)
            .collect();
        ids.sort_unstable();
        ids
    }
}
