//! Core types and logic for Arbor.
//!
//! This module contains the course loader, the read-only skill graph, the
//! progression engine, badge predicates, and the companion state machine.

pub mod achievements;
pub mod companion;
pub mod course;
pub mod engine;
pub mod graph;
pub mod loader;
pub mod predicate;
pub mod progress;

pub use achievements::AchievementDispatcher;
pub use companion::{
    Companion, CompanionStage, CompanionState, Direction, Transition, TransitionOutcome,
};
pub use course::{load_course_file, CourseData, RawSkill};
pub use engine::{weighted_xp, ProgressionEngine};
pub use graph::{SkillGraph, SkillNode, DEFAULT_TRACK_MULTIPLIER};
pub use loader::{load, ValidationReport, Violation};
pub use predicate::{Badge, Predicate};
pub use progress::{LearningEvent, Outcome, StudentProgress, StudentRecord, XpLedgerEntry};
