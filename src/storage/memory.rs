//! In-memory progress storage.
//!
//! Used by tests and by embedders that persist records elsewhere.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::core::StudentRecord;
use crate::error::Result;
use crate::storage::ProgressStore;

/// In-memory progress store.
///
/// Thread-safe implementation using `RwLock<HashMap>`.
/// Records are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    records: RwLock<HashMap<String, StudentRecord>>,
}

impl MemoryProgressStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProgressStore for MemoryProgressStore {
    fn get(&self, student_id: &str) -> Result<Option<StudentRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(student_id).cloned())
    }

    fn put(&self, record: &StudentRecord) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.student_id().to_string(), record.clone());
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = records.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
