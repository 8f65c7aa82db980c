//! Companion state machine.
//!
//! Each student has a companion that moves through
//! Egg → Hatchling → Juvenile → Adult → Evolved, driven by a daily
//! consistency score computed outside the engine. Sustained consistency
//! advances it one stage; sustained neglect decays it one stage, never
//! below Egg.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CompanionConfig;
use crate::error::{ArborError, Result};

/// Companion growth stage, ordered from first to last.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum CompanionStage {
    #[default]
    Egg,
    Hatchling,
    Juvenile,
    Adult,
    Evolved,
}

impl CompanionStage {
    /// Every stage in order.
    pub const ALL: [CompanionStage; 5] = [
        CompanionStage::Egg,
        CompanionStage::Hatchling,
        CompanionStage::Juvenile,
        CompanionStage::Adult,
        CompanionStage::Evolved,
    ];

    /// The stage one step forward, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Egg => Some(Self::Hatchling),
            Self::Hatchling => Some(Self::Juvenile),
            Self::Juvenile => Some(Self::Adult),
            Self::Adult => Some(Self::Evolved),
            Self::Evolved => None,
        }
    }

    /// The stage one step back, if any.
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::Egg => None,
            Self::Hatchling => Some(Self::Egg),
            Self::Juvenile => Some(Self::Hatchling),
            Self::Adult => Some(Self::Juvenile),
            Self::Evolved => Some(Self::Adult),
        }
    }

    /// Key used for this stage's section in the config file.
    pub fn config_key(self) -> &'static str {
        match self {
            Self::Egg => "egg",
            Self::Hatchling => "hatchling",
            Self::Juvenile => "juvenile",
            Self::Adult => "adult",
            Self::Evolved => "evolved",
        }
    }
}

impl std::fmt::Display for CompanionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Egg => "Egg",
            Self::Hatchling => "Hatchling",
            Self::Juvenile => "Juvenile",
            Self::Adult => "Adult",
            Self::Evolved => "Evolved",
        };
        f.write_str(name)
    }
}

/// Direction of a companion transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Advance,
    Decay,
}

/// Persisted companion state for one student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CompanionState {
    /// Current stage.
    pub stage: CompanionStage,
    /// Most recent consistency score fed in (0.0 to 1.0).
    pub consistency_score: f64,
    /// Ticks spent in the current stage.
    pub days_in_stage: u32,
    /// Consecutive ticks at or above the current stage's advance threshold.
    pub qualifying_days: u32,
    /// Consecutive ticks below the neglect threshold.
    pub neglect_streak: u32,
    /// When the last tick was applied.
    pub last_tick: Option<DateTime<Utc>>,
}

/// A single stage change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: CompanionStage,
    pub to: CompanionStage,
    pub direction: Direction,
}

impl Transition {
    /// Attach the student the transition belongs to.
    pub fn for_student(self, student_id: impl Into<String>) -> TransitionOutcome {
        TransitionOutcome {
            student_id: student_id.into(),
            from: self.from,
            to: self.to,
            direction: self.direction,
        }
    }
}

/// A stage change produced by a tick, as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    /// Student whose companion changed.
    pub student_id: String,
    /// Stage before the tick.
    pub from: CompanionStage,
    /// Stage after the tick.
    pub to: CompanionStage,
    /// Whether the companion advanced or decayed.
    pub direction: Direction,
}

/// Companion state machine.
///
/// All companion state mutations go through this struct.
#[derive(Debug)]
pub struct Companion<'a> {
    state: &'a mut CompanionState,
    config: &'a CompanionConfig,
}

impl<'a> Companion<'a> {
    /// Create a new companion manager over existing state.
    ///
    /// # Errors
    ///
    /// Rejects a config with a zero day count or a neglect threshold that
    /// is not below every advance threshold.
    pub fn new(state: &'a mut CompanionState, config: &'a CompanionConfig) -> Result<Self> {
        config.check()?;
        Ok(Self { state, config })
    }

    /// Get the current stage.
    pub fn stage(&self) -> CompanionStage {
        self.state.stage
    }

    /// Apply one daily tick.
    ///
    /// Returns the stage change, if any. At most one stage moves per tick.
    pub fn tick(
        &mut self,
        consistency_score: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Transition>> {
        if !CompanionConfig::is_valid_threshold(consistency_score) {
            return Err(ArborError::InvalidConsistency {
                value: consistency_score,
            });
        }

        self.state.consistency_score = consistency_score;
        self.state.last_tick = Some(now);
        self.state.days_in_stage = self.state.days_in_stage.saturating_add(1);

        let rule = self.config.advance_rule(self.state.stage).copied();

        match rule {
            Some(rule) if consistency_score >= rule.consistency_threshold => {
                self.state.qualifying_days = self.state.qualifying_days.saturating_add(1);
            }
            _ => self.state.qualifying_days = 0,
        }

        if consistency_score < self.config.neglect_threshold {
            // Saturate at the limit so an Egg under neglect does not count up forever.
            self.state.neglect_streak =
                (self.state.neglect_streak + 1).min(self.config.neglect_days);
        } else {
            self.state.neglect_streak = 0;
        }

        if let Some(rule) = rule {
            if self.state.qualifying_days >= rule.min_days {
                if let Some(next) = self.state.stage.next() {
                    return Ok(Some(self.transition(next, Direction::Advance)));
                }
            }
        }

        if self.state.neglect_streak >= self.config.neglect_days {
            if let Some(previous) = self.state.stage.previous() {
                return Ok(Some(self.transition(previous, Direction::Decay)));
            }
        }

        Ok(None)
    }

    /// Move to `to` and reset every per-stage counter.
    fn transition(&mut self, to: CompanionStage, direction: Direction) -> Transition {
        let from = self.state.stage;
        self.state.stage = to;
        self.state.days_in_stage = 0;
        self.state.qualifying_days = 0;
        self.state.neglect_streak = 0;
        Transition {
            from,
            to,
            direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvanceRule;

    fn config() -> CompanionConfig {
        CompanionConfig::default()
    }

    fn tick(
        state: &mut CompanionState,
        config: &CompanionConfig,
        score: f64,
    ) -> Option<Transition> {
        Companion::new(state, config)
            .unwrap()
            .tick(score, Utc::now())
            .unwrap()
    }

    #[test]
    fn test_initial_state_is_egg() {
        let state = CompanionState::default();
        assert_eq!(state.stage, CompanionStage::Egg);
        assert_eq!(state.days_in_stage, 0);
    }

    #[test]
    fn test_stage_ordering() {
        assert!(CompanionStage::Egg < CompanionStage::Hatchling);
        assert!(CompanionStage::Adult < CompanionStage::Evolved);
        assert_eq!(CompanionStage::Evolved.next(), None);
        assert_eq!(CompanionStage::Egg.previous(), None);
        assert_eq!(
            CompanionStage::Juvenile.previous(),
            Some(CompanionStage::Hatchling)
        );
    }

    #[test]
    fn test_advance_after_min_days() {
        let config = config();
        let mut state = CompanionState::default();

        // egg rule: 0.5 for 2 days
        assert_eq!(tick(&mut state, &config, 0.9), None);
        assert_eq!(state.qualifying_days, 1);

        let change = tick(&mut state, &config, 0.9);
        assert_eq!(
            change,
            Some(Transition {
                from: CompanionStage::Egg,
                to: CompanionStage::Hatchling,
                direction: Direction::Advance,
            })
        );
        assert_eq!(state.days_in_stage, 0);
        assert_eq!(state.qualifying_days, 0);
    }

    #[test]
    fn test_qualifying_days_must_be_consecutive() {
        let config = config();
        let mut state = CompanionState::default();

        tick(&mut state, &config, 0.9);
        tick(&mut state, &config, 0.4);
        assert_eq!(state.qualifying_days, 0);
        assert_eq!(tick(&mut state, &config, 0.9), None);
        assert_eq!(state.stage, CompanionStage::Egg);
    }

    #[test]
    fn test_hatchling_to_juvenile_then_decay_to_hatchling() {
        let config = config();
        let mut state = CompanionState {
            stage: CompanionStage::Hatchling,
            ..Default::default()
        };

        // hatchling rule: 0.6 for 3 days
        let mut transitions = Vec::new();
        for _ in 0..3 {
            if let Some(change) = tick(&mut state, &config, 0.95) {
                transitions.push(change);
            }
        }
        assert_eq!(
            transitions,
            vec![Transition {
                from: CompanionStage::Hatchling,
                to: CompanionStage::Juvenile,
                direction: Direction::Advance,
            }]
        );
        assert_eq!(state.days_in_stage, 0);

        // neglect: below 0.3 for 3 ticks
        assert_eq!(tick(&mut state, &config, 0.1), None);
        assert_eq!(tick(&mut state, &config, 0.1), None);
        let change = tick(&mut state, &config, 0.1);
        assert_eq!(
            change,
            Some(Transition {
                from: CompanionStage::Juvenile,
                to: CompanionStage::Hatchling,
                direction: Direction::Decay,
            })
        );
        assert_eq!(state.stage, CompanionStage::Hatchling);
        assert_eq!(state.days_in_stage, 0);
        assert_eq!(state.neglect_streak, 0);
    }

    #[test]
    fn test_neglect_streak_resets_on_recovery() {
        let config = config();
        let mut state = CompanionState {
            stage: CompanionStage::Adult,
            ..Default::default()
        };

        tick(&mut state, &config, 0.1);
        tick(&mut state, &config, 0.1);
        tick(&mut state, &config, 0.5);
        assert_eq!(state.neglect_streak, 0);
        tick(&mut state, &config, 0.1);
        assert_eq!(state.stage, CompanionStage::Adult);
    }

    #[test]
    fn test_egg_never_decays() {
        let config = config();
        let mut state = CompanionState::default();

        for _ in 0..20 {
            assert_eq!(tick(&mut state, &config, 0.0), None);
        }
        assert_eq!(state.stage, CompanionStage::Egg);
        assert_eq!(state.neglect_streak, config.neglect_days);
        assert_eq!(state.days_in_stage, 20);
    }

    #[test]
    fn test_evolved_is_stable_but_decays() {
        let config = config();
        let mut state = CompanionState {
            stage: CompanionStage::Evolved,
            ..Default::default()
        };

        for _ in 0..10 {
            assert_eq!(tick(&mut state, &config, 1.0), None);
        }
        assert_eq!(state.stage, CompanionStage::Evolved);
        assert_eq!(state.qualifying_days, 0);

        for _ in 0..config.neglect_days {
            tick(&mut state, &config, 0.0);
        }
        assert_eq!(state.stage, CompanionStage::Adult);
    }

    #[test]
    fn test_single_day_rule_moves_one_stage_per_tick() {
        let mut config = config();
        for rule in [
            &mut config.egg,
            &mut config.hatchling,
            &mut config.juvenile,
            &mut config.adult,
        ] {
            *rule = AdvanceRule::new(0.4, 1);
        }
        let mut state = CompanionState::default();

        assert_eq!(
            tick(&mut state, &config, 1.0).map(|t| t.to),
            Some(CompanionStage::Hatchling)
        );
        assert_eq!(
            tick(&mut state, &config, 1.0).map(|t| t.to),
            Some(CompanionStage::Juvenile)
        );
    }

    #[test]
    fn test_rejects_unusable_config() {
        let mut state = CompanionState::default();

        let mut zero_days = config();
        zero_days.egg.min_days = 0;
        let err = Companion::new(&mut state, &zero_days).unwrap_err();
        assert!(matches!(err, ArborError::Config { .. }));

        let mut overlapping = config();
        overlapping.neglect_threshold = 0.55;
        assert!(Companion::new(&mut state, &overlapping).is_err());

        let mut no_neglect_days = config();
        no_neglect_days.neglect_days = 0;
        assert!(Companion::new(&mut state, &no_neglect_days).is_err());

        assert_eq!(state, CompanionState::default());
    }

    #[test]
    fn test_rejects_out_of_range_score() {
        let config = config();
        let mut state = CompanionState::default();
        let mut companion = Companion::new(&mut state, &config).unwrap();

        for bad in [-0.1, 1.01, f64::NAN, f64::INFINITY] {
            let err = companion.tick(bad, Utc::now()).unwrap_err();
            assert!(matches!(err, ArborError::InvalidConsistency { .. }));
        }
        assert_eq!(state, CompanionState::default());
    }

    #[test]
    fn test_records_score_and_tick_time() {
        let config = config();
        let mut state = CompanionState::default();
        let now = Utc::now();
        Companion::new(&mut state, &config)
            .unwrap()
            .tick(0.42, now)
            .unwrap();

        assert!((state.consistency_score - 0.42).abs() < f64::EPSILON);
        assert_eq!(state.last_tick, Some(now));
        assert_eq!(state.days_in_stage, 1);
    }

    #[test]
    fn test_stage_serde_snake_case() {
        let json = serde_json::to_string(&CompanionStage::Hatchling).unwrap();
        assert_eq!(json, "\"hatchling\"");
        let stage: CompanionStage = serde_json::from_str("\"evolved\"").unwrap();
        assert_eq!(stage, CompanionStage::Evolved);
    }

    // =========================================================================
    // Property-based tests
    // =========================================================================

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Property: a tick never skips a stage and never goes below Egg
            #[test]
            fn prop_tick_moves_at_most_one_stage(
                scores in proptest::collection::vec(0.0f64..=1.0, 1..200),
            ) {
                let config = CompanionConfig::default();
                let mut state = CompanionState::default();

                for score in scores {
                    let before = state.stage;
                    let change = Companion::new(&mut state, &config)
                        .unwrap()
                        .tick(score, Utc::now())
                        .unwrap();
                    let after = state.stage;

                    match change {
                        None => prop_assert_eq!(before, after),
                        Some(t) => {
                            prop_assert_eq!(t.from, before);
                            prop_assert_eq!(t.to, after);
                            let expected = match t.direction {
                                Direction::Advance => before.next(),
                                Direction::Decay => before.previous(),
                            };
                            prop_assert_eq!(expected, Some(after));
                        }
                    }
                    prop_assert!(after >= CompanionStage::Egg);
                }
            }

            // Property: counters are cleared on every transition
            #[test]
            fn prop_transition_resets_counters(
                scores in proptest::collection::vec(0.0f64..=1.0, 1..100),
            ) {
                let config = CompanionConfig::default();
                let mut state = CompanionState::default();

                for score in scores {
                    let change = Companion::new(&mut state, &config)
                        .unwrap()
                        .tick(score, Utc::now())
                        .unwrap();
                    if change.is_some() {
                        prop_assert_eq!(state.days_in_stage, 0);
                        prop_assert_eq!(state.qualifying_days, 0);
                        prop_assert_eq!(state.neglect_streak, 0);
                    }
                }
            }
        }
    }
}
