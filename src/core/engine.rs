//! Progression engine.
//!
//! Applies learning events to student progress: XP weighting, mastery,
//! unlocks and badges, then persists the record and publishes
//! notifications. Also drives companion ticks and administrative resets.
//!
//! # Concurrency
//!
//! Every mutation for one student runs under that student's lock, so
//! events for one student are applied one at a time in the order callers
//! submit them. Different students proceed in parallel. Each operation also
//! holds the graph read lock for its whole critical section; [`reload`]
//! takes the write lock, so a swap waits for in-flight events to finish and
//! no event ever sees two graphs.
//!
//! [`reload`]: ProgressionEngine::reload

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::CompanionConfig;
use crate::core::achievements::AchievementDispatcher;
use crate::core::companion::{Companion, TransitionOutcome};
use crate::core::course::CourseData;
use crate::core::graph::SkillGraph;
use crate::core::loader::{self, ValidationReport};
use crate::core::progress::{LearningEvent, Outcome, StudentProgress, StudentRecord, XpLedgerEntry};
use crate::error::{ArborError, FailOpen, Result};
use crate::events::{EngineEvent, EngineEventKind, EventSink};
use crate::storage::ProgressStore;
use crate::util::is_safe_id;

/// Products are snapped to this many decimal places before rounding.
const XP_SNAP: f64 = 1e9;

/// Idle per-student locks are dropped once the map grows this large.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Weight raw points and round half up to a whole XP amount.
///
/// The product is first snapped to nine decimal places so that values such
/// as `10 * 1.15` (which is `11.499999999999998` in binary) round as the
/// exact decimal `11.5` would.
pub fn weighted_xp(raw_points: u64, multiplier: f64) -> u64 {
    let product = raw_points as f64 * multiplier;
    let snapped = (product * XP_SNAP).round() / XP_SNAP;
    (snapped + 0.5).floor() as u64
}

/// Applies events and companion ticks against a shared skill graph.
pub struct ProgressionEngine<S: ProgressStore> {
    graph: RwLock<Arc<SkillGraph>>,
    store: S,
    companion: CompanionConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    sinks: Vec<Box<dyn EventSink>>,
}

impl<S: ProgressStore> ProgressionEngine<S> {
    /// Create an engine over a loaded graph and a progress store.
    ///
    /// # Errors
    ///
    /// Returns a config error if the companion thresholds or day counts
    /// are unusable (see [`CompanionConfig::check`]).
    pub fn new(graph: SkillGraph, store: S, companion: CompanionConfig) -> Result<Self> {
        companion.check()?;
        Ok(Self {
            graph: RwLock::new(Arc::new(graph)),
            store,
            companion,
            locks: Mutex::new(HashMap::new()),
            sinks: Vec::new(),
        })
    }

    /// Add a notification sink.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Current graph snapshot.
    pub fn graph(&self) -> Arc<SkillGraph> {
        Arc::clone(&self.graph.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The underlying progress store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Companion configuration in use.
    pub fn companion_config(&self) -> &CompanionConfig {
        &self.companion
    }

    /// Apply one learning event.
    ///
    /// A replayed `source_event_id` returns the outcome recorded the first
    /// time and changes nothing.
    ///
    /// # Errors
    ///
    /// Rejects unknown skills and tracks, negative points, out-of-range
    /// mastery and unusable student ids without touching stored progress.
    /// Store failures are returned as-is; nothing is published in that case.
    pub fn apply_event(&self, event: &LearningEvent) -> Result<Outcome> {
        check_student_id(&event.student_id)?;

        let graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);
        let lock = self.student_lock(&event.student_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self
            .store
            .get(&event.student_id)?
            .unwrap_or_else(|| StudentRecord::new(&event.student_id));

        if let Some(entry) = record.find_entry(&event.source_event_id) {
            debug!(
                student_id = %event.student_id,
                source_event_id = %event.source_event_id,
                "replayed event, returning recorded outcome"
            );
            return Ok(entry.outcome.clone());
        }

        let raw_points = validate_event(&graph, event)?;

        let now = Utc::now();
        let multiplier = graph.track_multiplier(&event.skill_id, &event.track);
        let xp_awarded = weighted_xp(raw_points, multiplier);

        let progress = &mut record.progress;
        progress.xp_total = progress.xp_total.saturating_add(xp_awarded);
        if let Some(mastery) = event.mastery {
            progress.raise_mastery(&event.skill_id, mastery);
        }

        let newly_unlocked = graph.unlock_frontier(progress);
        progress.unlocked.extend(newly_unlocked.iter().cloned());

        let newly_badged = AchievementDispatcher::new(graph.badges()).evaluate(progress);

        progress.last_sequence += 1;
        progress.updated_at = now;

        let outcome = Outcome {
            xp_awarded,
            newly_unlocked,
            newly_badged,
        };
        record.append(XpLedgerEntry {
            student_id: event.student_id.clone(),
            source_event_id: event.source_event_id.clone(),
            skill_id: event.skill_id.clone(),
            amount: xp_awarded,
            sequence: record.progress.last_sequence,
            timestamp: event.timestamp.unwrap_or(now),
            outcome: outcome.clone(),
        });

        self.store.put(&record)?;

        info!(
            student_id = %event.student_id,
            source_event_id = %event.source_event_id,
            skill_id = %event.skill_id,
            xp_awarded,
            xp_total = record.progress.xp_total,
            unlocked = outcome.newly_unlocked.len(),
            badges = outcome.newly_badged.len(),
            "applied learning event"
        );

        for skill_id in &outcome.newly_unlocked {
            self.publish(EngineEvent::new(
                &event.student_id,
                EngineEventKind::unlock(skill_id),
            ));
        }
        for badge_id in &outcome.newly_badged {
            self.publish(EngineEvent::new(
                &event.student_id,
                EngineEventKind::badge(badge_id),
            ));
        }

        Ok(outcome)
    }

    /// Read-only snapshot of a student's progress.
    ///
    /// Students with no record yet get an empty snapshot, which is not
    /// persisted.
    pub fn get_progress(&self, student_id: &str) -> Result<StudentProgress> {
        check_student_id(student_id)?;
        Ok(self
            .store
            .get(student_id)?
            .map(|record| record.progress)
            .unwrap_or_else(|| StudentProgress::new(student_id)))
    }

    /// Skills the student could unlock next.
    pub fn next_eligible(&self, student_id: &str) -> Result<Vec<String>> {
        let progress = self.get_progress(student_id)?;
        Ok(self.graph().next_eligible_nodes(&progress))
    }

    /// The student's XP ledger in application order.
    pub fn ledger(&self, student_id: &str) -> Result<Vec<XpLedgerEntry>> {
        check_student_id(student_id)?;
        Ok(self
            .store
            .get(student_id)?
            .map(StudentRecord::into_ledger)
            .unwrap_or_default())
    }

    /// Every student with a stored record.
    pub fn students(&self) -> Result<Vec<String>> {
        self.store.list_ids()
    }

    /// Feed one daily consistency score to a student's companion.
    pub fn tick_companion(
        &self,
        student_id: &str,
        consistency_score: f64,
    ) -> Result<Option<TransitionOutcome>> {
        self.tick_companion_at(student_id, consistency_score, Utc::now())
    }

    /// Like [`tick_companion`](Self::tick_companion) with an explicit clock.
    pub fn tick_companion_at(
        &self,
        student_id: &str,
        consistency_score: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<TransitionOutcome>> {
        check_student_id(student_id)?;

        let _graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);
        let lock = self.student_lock(student_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self
            .store
            .get(student_id)?
            .unwrap_or_else(|| StudentRecord::new(student_id));

        let transition = Companion::new(&mut record.progress.companion, &self.companion)?
            .tick(consistency_score, now)?;
        record.progress.updated_at = now;

        self.store.put(&record)?;

        let Some(transition) = transition else {
            debug!(student_id, consistency_score, "companion tick");
            return Ok(None);
        };

        info!(
            student_id,
            from = %transition.from,
            to = %transition.to,
            direction = ?transition.direction,
            "companion changed stage"
        );
        self.publish(EngineEvent::new(
            student_id,
            EngineEventKind::CompanionTransition {
                from: transition.from,
                to: transition.to,
                direction: transition.direction,
            },
        ));

        Ok(Some(transition.for_student(student_id)))
    }

    /// Administrative reset of one skill's mastery to zero.
    ///
    /// XP, unlocks and badges are left as they are. Returns whether a
    /// non-zero value was cleared.
    pub fn reset_mastery(&self, student_id: &str, skill_id: &str) -> Result<bool> {
        check_student_id(student_id)?;

        let graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);
        if !graph.contains(skill_id) {
            return Err(ArborError::unknown_skill(skill_id));
        }

        let lock = self.student_lock(student_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.store.get(student_id)?.ok_or_else(|| {
            ArborError::invalid_state(format!("no progress recorded for student {}", student_id))
        })?;

        let cleared = match record.progress.mastery.get_mut(skill_id) {
            Some(value) if *value > 0.0 => {
                *value = 0.0;
                true
            }
            _ => false,
        };
        if !cleared {
            return Ok(false);
        }

        record.progress.updated_at = Utc::now();
        self.store.put(&record)?;
        info!(student_id, skill_id, "mastery reset");
        Ok(true)
    }

    /// Swap in a new graph.
    ///
    /// Waits for in-flight operations to finish. Returns the previous graph.
    pub fn reload(&self, graph: SkillGraph) -> Arc<SkillGraph> {
        let mut current = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *current, Arc::new(graph));
        info!(skills = current.len(), "skill graph reloaded");
        previous
    }

    /// Validate course data against the current tracks and swap it in.
    ///
    /// On a validation failure the current graph stays active.
    pub fn reload_course(&self, course: &CourseData) -> Result<ValidationReport> {
        let tracks = self.graph().tracks().clone();
        let (graph, report) = loader::load(course, &tracks)?;
        self.reload(graph);
        Ok(report)
    }

    fn student_lock(&self, student_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.len() >= LOCK_PRUNE_THRESHOLD {
            // Only the map holds an idle lock, so dropping it cannot split a
            // student across two mutexes.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(student_id.to_string()).or_default())
    }

    /// Number of per-student locks currently kept.
    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn publish(&self, event: EngineEvent) {
        for sink in &self.sinks {
            sink.publish(&event)
                .fail_open_default("failed to publish engine event");
        }
    }
}

fn check_student_id(student_id: &str) -> Result<()> {
    if is_safe_id(student_id) {
        Ok(())
    } else {
        Err(ArborError::invalid_id(student_id))
    }
}

/// Check an event against the graph. Returns the raw points as unsigned.
fn validate_event(graph: &SkillGraph, event: &LearningEvent) -> Result<u64> {
    if !graph.contains(&event.skill_id) {
        return Err(ArborError::unknown_skill(&event.skill_id));
    }
    if !graph.has_track(&event.track) {
        return Err(ArborError::unknown_track(&event.track));
    }
    let raw_points = u64::try_from(event.raw_points).map_err(|_| ArborError::NegativePoints {
        points: event.raw_points,
    })?;
    if let Some(mastery) = event.mastery {
        if !(0.0..=100.0).contains(&mastery) {
            return Err(ArborError::InvalidMastery { value: mastery });
        }
    }
    Ok(raw_points)
}
