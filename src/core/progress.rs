//! Student progress, learning events, and the XP ledger.
//!
//! [`StudentProgress`] is the published read model. [`StudentRecord`] pairs
//! it with the append-only ledger so both are persisted in one write.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::companion::CompanionState;

/// A learning event submitted by an upstream collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningEvent {
    /// Student the event belongs to.
    pub student_id: String,
    /// Upstream identifier, unique per student. Replays are no-ops.
    pub source_event_id: String,
    /// Skill the points were earned on.
    pub skill_id: String,
    /// Unweighted points. Must be non-negative.
    pub raw_points: i64,
    /// Track used to select the multiplier.
    pub track: String,
    /// Mastery percentage (0-100) demonstrated by this event, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mastery: Option<f64>,
    /// When the activity happened. Defaults to the time of application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LearningEvent {
    /// Create a new event without mastery or timestamp.
    pub fn new(
        student_id: impl Into<String>,
        source_event_id: impl Into<String>,
        skill_id: impl Into<String>,
        raw_points: i64,
        track: impl Into<String>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            source_event_id: source_event_id.into(),
            skill_id: skill_id.into(),
            raw_points,
            track: track.into(),
            mastery: None,
            timestamp: None,
        }
    }

    /// Attach a demonstrated mastery percentage.
    pub fn with_mastery(mut self, mastery: f64) -> Self {
        self.mastery = Some(mastery);
        self
    }

    /// Attach an activity timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// What applying an event produced.
///
/// This is the only value grade sync and notifications observe.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outcome {
    /// XP credited after track weighting and rounding.
    pub xp_awarded: u64,
    /// Skills unlocked by this event, prerequisites first.
    pub newly_unlocked: Vec<String>,
    /// Badges earned by this event, in definition order.
    pub newly_badged: Vec<String>,
}

/// One append-only ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct XpLedgerEntry {
    pub student_id: String,
    pub source_event_id: String,
    pub skill_id: String,
    pub amount: u64,
    /// Position of this event in the student's applied sequence (1-based).
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    /// Outcome returned when the event was first applied.
    pub outcome: Outcome,
}

/// Per-student progress snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentProgress {
    /// Student identifier.
    pub student_id: String,
    /// Mastery percentage per skill (0-100).
    pub mastery: BTreeMap<String, f64>,
    /// Total XP awarded.
    pub xp_total: u64,
    /// Unlocked skill ids.
    pub unlocked: BTreeSet<String>,
    /// Earned badge ids.
    pub badges: BTreeSet<String>,
    /// Companion state.
    pub companion: CompanionState,
    /// Sequence number of the last applied event.
    pub last_sequence: u64,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl StudentProgress {
    /// Create empty progress: zero XP, nothing unlocked, Egg companion.
    pub fn new(student_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            student_id: student_id.into(),
            mastery: BTreeMap::new(),
            xp_total: 0,
            unlocked: BTreeSet::new(),
            badges: BTreeSet::new(),
            companion: CompanionState::default(),
            last_sequence: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mastery of a skill, zero if never recorded.
    pub fn mastery_of(&self, skill_id: &str) -> f64 {
        self.mastery.get(skill_id).copied().unwrap_or(0.0)
    }

    /// Raise mastery of a skill to `percent` if it is higher.
    ///
    /// Returns whether the stored value changed.
    pub fn raise_mastery(&mut self, skill_id: &str, percent: f64) -> bool {
        match self.mastery.get_mut(skill_id) {
            Some(current) if *current >= percent => false,
            Some(current) => {
                *current = percent;
                true
            }
            None => {
                self.mastery.insert(skill_id.to_string(), percent);
                percent > 0.0
            }
        }
    }
}

/// Progress plus ledger, stored and replaced as a unit.
///
/// Ledger rows are looked up by `source_event_id` through an index that is
/// rebuilt on load and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "StoredRecord")]
pub struct StudentRecord {
    pub progress: StudentProgress,
    ledger: Vec<XpLedgerEntry>,
    #[serde(skip)]
    by_event: HashMap<String, usize>,
}

/// On-disk shape of a [`StudentRecord`].
#[derive(Deserialize)]
struct StoredRecord {
    progress: StudentProgress,
    #[serde(default)]
    ledger: Vec<XpLedgerEntry>,
}

impl From<StoredRecord> for StudentRecord {
    fn from(stored: StoredRecord) -> Self {
        let by_event = stored
            .ledger
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.source_event_id.clone(), i))
            .collect();
        Self {
            progress: stored.progress,
            ledger: stored.ledger,
            by_event,
        }
    }
}

impl StudentRecord {
    /// Create a fresh record for a student seen for the first time.
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            progress: StudentProgress::new(student_id),
            ledger: Vec::new(),
            by_event: HashMap::new(),
        }
    }

    /// Student identifier.
    pub fn student_id(&self) -> &str {
        &self.progress.student_id
    }

    /// Ledger rows in application order.
    pub fn ledger(&self) -> &[XpLedgerEntry] {
        &self.ledger
    }

    /// Take the ledger out of the record.
    pub fn into_ledger(self) -> Vec<XpLedgerEntry> {
        self.ledger
    }

    /// Append a ledger row.
    ///
    /// Callers check [`find_entry`](Self::find_entry) first; a row for an
    /// event id already present is ignored and `false` is returned.
    pub fn append(&mut self, entry: XpLedgerEntry) -> bool {
        if self.by_event.contains_key(&entry.source_event_id) {
            return false;
        }
        self.by_event
            .insert(entry.source_event_id.clone(), self.ledger.len());
        self.ledger.push(entry);
        true
    }

    /// Find the ledger entry recorded for an upstream event id.
    pub fn find_entry(&self, source_event_id: &str) -> Option<&XpLedgerEntry> {
        self.by_event
            .get(source_event_id)
            .and_then(|&i| self.ledger.get(i))
    }
}
