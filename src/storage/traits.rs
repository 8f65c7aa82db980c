//! Progress storage traits for Arbor.
//!
//! This module defines the `ProgressStore` trait for student record persistence.

use std::sync::Arc;

use crate::core::StudentRecord;
use crate::error::Result;

/// Trait for progress storage backends.
///
/// A record holds a student's progress and ledger together, so a single
/// `put` replaces both. Callers serialize writes per student; stores only
/// need to make each `put` atomic.
pub trait ProgressStore: Send + Sync {
    /// Retrieve a student's record.
    ///
    /// Returns `Ok(None)` if the student has never been seen.
    fn get(&self, student_id: &str) -> Result<Option<StudentRecord>>;

    /// Save a record, replacing any previous one.
    fn put(&self, record: &StudentRecord) -> Result<()>;

    /// List every stored student id, sorted.
    fn list_ids(&self) -> Result<Vec<String>>;

    /// Check if a student has a record.
    fn exists(&self, student_id: &str) -> Result<bool> {
        Ok(self.get(student_id)?.is_some())
    }
}

/// Blanket implementation of ProgressStore for Arc-wrapped stores.
///
/// This allows sharing one store between an engine and a test.
impl<T: ProgressStore + ?Sized> ProgressStore for Arc<T> {
    fn get(&self, student_id: &str) -> Result<Option<StudentRecord>> {
        (**self).get(student_id)
    }

    fn put(&self, record: &StudentRecord) -> Result<()> {
        (**self).put(record)
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        (**self).list_ids()
    }

    fn exists(&self, student_id: &str) -> Result<bool> {
        (**self).exists(student_id)
    }
}
