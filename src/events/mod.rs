//! Outbound notification events.
//!
//! The engine publishes an [`EngineEvent`] for every unlock, badge award and
//! companion stage change, after the student's record has been persisted.
//! Events are delivered to [`EventSink`]s; delivery failures are logged and
//! never undo the committed update.

pub mod log;
pub mod sink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{CompanionStage, Direction};

pub use log::EventLog;
pub use sink::{ChannelSink, EventSink, MemorySink};

/// Schema version for engine events.
///
/// Increment when the event schema changes in a breaking way.
pub const EVENT_SCHEMA_VERSION: u8 = 1;

/// A notification about one student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineEvent {
    /// Schema version for forward compatibility.
    pub v: u8,
    /// When the event was produced.
    pub ts: DateTime<Utc>,
    /// Student the event is about.
    pub student_id: String,
    /// What happened.
    #[serde(flatten)]
    pub kind: EngineEventKind,
}

impl EngineEvent {
    /// Create a new event with the current timestamp.
    pub fn new(student_id: impl Into<String>, kind: EngineEventKind) -> Self {
        Self::with_timestamp(student_id, kind, Utc::now())
    }

    /// Create an event with a specific timestamp.
    pub fn with_timestamp(
        student_id: impl Into<String>,
        kind: EngineEventKind,
        ts: DateTime<Utc>,
    ) -> Self {
        Self {
            v: EVENT_SCHEMA_VERSION,
            ts,
            student_id: student_id.into(),
            kind,
        }
    }
}

/// The kind of notification and its data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEventKind {
    /// A skill was unlocked.
    Unlock { skill_id: String },
    /// A badge was awarded.
    Badge { badge_id: String },
    /// The companion changed stage.
    CompanionTransition {
        from: CompanionStage,
        to: CompanionStage,
        direction: Direction,
    },
}

impl EngineEventKind {
    /// Build an unlock event.
    pub fn unlock(skill_id: impl Into<String>) -> Self {
        Self::Unlock {
            skill_id: skill_id.into(),
        }
    }

    /// Build a badge event.
    pub fn badge(badge_id: impl Into<String>) -> Self {
        Self::Badge {
            badge_id: badge_id.into(),
        }
    }

    /// Get the event name as a string.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Unlock { .. } => "unlock",
            Self::Badge { .. } => "badge",
            Self::CompanionTransition { .. } => "companion_transition",
        }
    }
}
