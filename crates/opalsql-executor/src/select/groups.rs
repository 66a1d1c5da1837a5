//! The group-state store
//!
//! Hashed grouping maps each composite group key to a per-group state
//! vector holding one slot per aggregate. Slots are assigned lazily, on
//! the first update of each aggregate; a state vector that turns out too
//! short doubles in place. The vectors live in a stable arena and the key
//! map stores arena positions, so growth never rebinds a map entry.
//!
//! Aggregates only ever read slots they wrote: a short vector from an
//! early group simply reports "no state" for slots assigned later.

use std::collections::HashMap;

use indexmap::IndexMap;

use opalsql_types::SqlValue;

use crate::errors::ExecutorError;
use crate::expression::{AggregateKind, AggregateState};

type GroupVector = Vec<Option<AggregateState>>;

pub struct QueryGroups {
    /// Aggregate id -> slot in every group vector.
    slots: HashMap<usize, usize>,
    /// Group key -> arena position. Insertion order is emission order.
    keys: IndexMap<SqlValue, usize>,
    arena: Vec<GroupVector>,
    current: Option<usize>,
    /// Monotonic per-input-row counter; aggregates use it to detect a new
    /// row within the current group.
    pub current_row_id: u64,
    expression_count: usize,
}

impl QueryGroups {
    pub fn new(expression_count: usize) -> Self {
        QueryGroups {
            slots: HashMap::new(),
            keys: IndexMap::new(),
            arena: Vec::new(),
            current: None,
            current_row_id: 0,
            expression_count,
        }
    }

    fn new_vector(&self) -> GroupVector {
        vec![None; self.slots.len().max(self.expression_count)]
    }

    /// Make the group for `key` current, creating it if needed.
    pub fn enter_group(&mut self, key: SqlValue) {
        let position = match self.keys.get(&key) {
            Some(&position) => position,
            None => {
                let vector = self.new_vector();
                self.arena.push(vector);
                let position = self.arena.len() - 1;
                self.keys.insert(key, position);
                position
            }
        };
        self.current = Some(position);
    }

    /// Sorted-group mode: discard the current state vector and start a
    /// fresh one. No key map is involved; only one group is live.
    pub fn begin_sorted_group(&mut self) {
        let vector = self.new_vector();
        match self.current {
            Some(position) => self.arena[position] = vector,
            None => {
                self.arena.push(vector);
                self.current = Some(self.arena.len() - 1);
            }
        }
    }

    /// The empty-key group that makes aggregates over an empty table
    /// produce one row.
    pub fn ensure_default_group(&mut self) {
        if self.keys.is_empty() {
            self.enter_group(SqlValue::Array(Vec::new()));
        }
    }

    pub fn next_row(&mut self) {
        self.current_row_id += 1;
    }

    pub fn group_count(&self) -> usize {
        self.keys.len()
    }

    /// Snapshot of (key, arena position) pairs for the emission loop.
    pub fn group_entries(&self) -> Vec<(SqlValue, usize)> {
        self.keys.iter().map(|(k, &v)| (k.clone(), v)).collect()
    }

    pub fn set_current(&mut self, position: usize) {
        self.current = Some(position);
    }

    /// State of an aggregate in the current group. `None` when the slot
    /// was never written for this group.
    pub fn state(&self, aggregate_id: usize) -> Option<&AggregateState> {
        let slot = *self.slots.get(&aggregate_id)?;
        let vector = &self.arena[self.current?];
        vector.get(slot)?.as_ref()
    }

    /// Fold a value into an aggregate's state in the current group,
    /// assigning its slot on first use and growing the vector (doubling)
    /// when the slot is past the end. The per-row id guard makes repeated
    /// touches of the same aggregate within one input row idempotent.
    pub fn update(
        &mut self,
        aggregate_id: usize,
        kind: AggregateKind,
        distinct: bool,
        value: Option<&SqlValue>,
    ) -> Result<(), ExecutorError> {
        let slot = match self.slots.get(&aggregate_id) {
            Some(&slot) => slot,
            None => {
                let slot = self.slots.len();
                self.slots.insert(aggregate_id, slot);
                slot
            }
        };
        let position = self.current.ok_or_else(|| {
            ExecutorError::Internal("aggregate update without a current group".to_string())
        })?;
        let vector = &mut self.arena[position];
        if slot >= vector.len() {
            let new_len = (vector.len() * 2).max(slot + 1);
            vector.resize(new_len, None);
        }
        let state = vector[slot].get_or_insert_with(|| AggregateState::new(kind, distinct));
        if state.last_row_id == self.current_row_id {
            return Ok(());
        }
        state.last_row_id = self.current_row_id;
        state.accumulate(value);
        Ok(())
    }
}
