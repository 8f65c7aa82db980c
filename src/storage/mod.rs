//! Progress storage for Arbor.
//!
//! This module provides persistent storage for student records,
//! supporting file-based and in-memory backends.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileProgressStore;
pub use memory::MemoryProgressStore;
pub use traits::ProgressStore;
