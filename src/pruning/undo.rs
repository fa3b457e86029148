//! Bounded undo history for pruning operations

use crate::context::models::Message;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Default number of undo records kept
pub const DEFAULT_UNDO_CAPACITY: usize = 5;

/// Everything a caller needs to reverse one pruning pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoRecord {
    pub operation_id: String,
    /// Discarded messages, full content
    pub removed_messages: Vec<Message>,
    /// Message ids of the context before pruning, in order
    pub original_order: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Insertion-ordered, fixed-capacity undo buffer.
///
/// Inserting into a full buffer evicts the oldest record. Taking a record
/// removes it, so each record can be consumed once.
#[derive(Debug, Clone)]
pub struct UndoBuffer {
    records: Arc<Mutex<IndexMap<String, UndoRecord>>>,
    capacity: usize,
}

impl Default for UndoBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_CAPACITY)
    }
}

impl UndoBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(IndexMap::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, UndoRecord>> {
        // A panic elsewhere cannot leave the map half-updated
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a record, returning the id of the evicted record if any
    pub fn push(&self, record: UndoRecord) -> Option<String> {
        if self.capacity == 0 {
            return Some(record.operation_id);
        }

        let mut records = self.lock();
        let mut evicted = None;

        if records.len() >= self.capacity && !records.contains_key(&record.operation_id) {
            if let Some((oldest, _)) = records.shift_remove_index(0) {
                debug!("Evicted undo record {}", oldest);
                evicted = Some(oldest);
            }
        }

        records.insert(record.operation_id.clone(), record);
        evicted
    }

    /// Remove and return a record
    pub fn take(&self, operation_id: &str) -> Option<UndoRecord> {
        self.lock().shift_remove(operation_id)
    }

    /// Clone a record without consuming it
    pub fn peek(&self, operation_id: &str) -> Option<UndoRecord> {
        self.lock().get(operation_id).cloned()
    }

    pub fn contains(&self, operation_id: &str) -> bool {
        self.lock().contains_key(operation_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Operation ids, oldest first
    pub fn history(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}
