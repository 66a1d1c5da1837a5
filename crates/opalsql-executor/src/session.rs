//! Query sessions
//!
//! A session binds query execution to one database and one logical
//! thread. It carries the per-query row counter, the user-settable
//! parameters, the abort flag, and the lazy-execution switch.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use opalsql_storage::Database;
use opalsql_types::SqlValue;

use crate::errors::ExecutorError;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub struct Session<'a> {
    id: u64,
    database: &'a Database,
    lazy_query_execution: bool,
    canceled: AtomicBool,
    current_row_number: Cell<u64>,
    parameters: RefCell<Vec<Option<SqlValue>>>,
}

impl<'a> Session<'a> {
    pub fn new(database: &'a Database) -> Self {
        Session {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            database,
            lazy_query_execution: false,
            canceled: AtomicBool::new(false),
            current_row_number: Cell::new(0),
            parameters: RefCell::new(Vec::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn database(&self) -> &'a Database {
        self.database
    }

    pub fn set_lazy_query_execution(&mut self, lazy: bool) {
        self.lazy_query_execution = lazy;
    }

    pub fn is_lazy_query_execution(&self) -> bool {
        self.lazy_query_execution
    }

    /// Request cancellation; checked between rows during scans.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    pub fn check_canceled(&self) -> Result<(), ExecutorError> {
        if self.canceled.load(Ordering::Relaxed) {
            Err(ExecutorError::QueryCanceled)
        } else {
            Ok(())
        }
    }

    pub fn set_current_row_number(&self, row_number: u64) {
        self.current_row_number.set(row_number);
    }

    pub fn current_row_number(&self) -> u64 {
        self.current_row_number.get()
    }

    /// Bind a value to a 0-based parameter slot, growing the slot vector.
    pub fn set_parameter(&self, index: usize, value: SqlValue) {
        let mut params = self.parameters.borrow_mut();
        if params.len() <= index {
            params.resize(index + 1, None);
        }
        params[index] = Some(value);
    }

    pub fn parameter(&self, index: usize) -> Result<SqlValue, ExecutorError> {
        self.parameters
            .borrow()
            .get(index)
            .cloned()
            .flatten()
            .ok_or(ExecutorError::ParameterNotSet(index))
    }

    /// Release all locks this session holds, as a transaction end would.
    pub fn release_locks(&self) {
        self.database.unlock_all(self.id);
    }
}
