//! Arbor - skill-tree progression and companion engine
//!
//! Arbor turns learning events into progress: weighted XP, mastery,
//! prerequisite-gated skill unlocks and badges over a validated skill DAG,
//! plus a companion whose growth stage follows a student's consistency.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod storage;
pub mod util;

pub use config::Config;
pub use core::{
    load, load_course_file, CourseData, LearningEvent, Outcome, ProgressionEngine, SkillGraph,
    StudentProgress, TransitionOutcome, ValidationReport,
};
pub use error::{ArborError, Result};
pub use events::{ChannelSink, EngineEvent, EngineEventKind, EventLog, EventSink, MemorySink};
pub use storage::{FileProgressStore, MemoryProgressStore, ProgressStore};

// CLI commands
pub use cli::{ApplyCommand, ProgressCommand, ResetCommand, TickCommand, ValidateCommand};
