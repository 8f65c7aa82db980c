//! Declarative badge predicates.
//!
//! Badges are earned when a predicate over a student's progress holds.
//! Predicates are data (threshold terms combined with AND/OR), never code,
//! so they serialize, validate at load time, and evaluate deterministically.

use serde::{Deserialize, Serialize};

use crate::core::progress::StudentProgress;

/// A badge definition from course data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Badge {
    /// Unique badge identifier.
    pub id: String,
    /// Condition under which the badge is earned.
    pub predicate: Predicate,
}

impl Badge {
    /// Create a new badge.
    pub fn new(id: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            id: id.into(),
            predicate,
        }
    }
}

/// A predicate over [`StudentProgress`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Every sub-predicate holds. An empty list holds.
    All { of: Vec<Predicate> },
    /// At least one sub-predicate holds. An empty list never holds.
    Any { of: Vec<Predicate> },
    /// Mastery of `skill` is at least `percent`.
    MasteryAtLeast { skill: String, percent: f64 },
    /// Total XP is at least `xp`.
    XpAtLeast { xp: u64 },
    /// `skill` is unlocked.
    Unlocked { skill: String },
    /// At least `count` skills are unlocked.
    UnlockedCount { count: usize },
}

impl Predicate {
    /// Build an `All` predicate.
    pub fn all(of: Vec<Predicate>) -> Self {
        Self::All { of }
    }

    /// Build an `Any` predicate.
    pub fn any(of: Vec<Predicate>) -> Self {
        Self::Any { of }
    }

    /// Build a mastery threshold term.
    pub fn mastery_at_least(skill: impl Into<String>, percent: f64) -> Self {
        Self::MasteryAtLeast {
            skill: skill.into(),
            percent,
        }
    }

    /// Build an XP threshold term.
    pub fn xp_at_least(xp: u64) -> Self {
        Self::XpAtLeast { xp }
    }

    /// Build an unlocked term.
    pub fn unlocked(skill: impl Into<String>) -> Self {
        Self::Unlocked {
            skill: skill.into(),
        }
    }

    /// Evaluate against a progress snapshot.
    ///
    /// Pure: depends only on `progress`.
    pub fn evaluate(&self, progress: &StudentProgress) -> bool {
        match self {
            Self::All { of } => of.iter().all(|p| p.evaluate(progress)),
            Self::Any { of } => of.iter().any(|p| p.evaluate(progress)),
            Self::MasteryAtLeast { skill, percent } => progress.mastery_of(skill) >= *percent,
            Self::XpAtLeast { xp } => progress.xp_total >= *xp,
            Self::Unlocked { skill } => progress.unlocked.contains(skill),
            Self::UnlockedCount { count } => progress.unlocked.len() >= *count,
        }
    }

    /// Visit every term in the tree, depth first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Predicate)) {
        visit(self);
        if let Self::All { of } | Self::Any { of } = self {
            for child in of {
                child.walk(visit);
            }
        }
    }

    /// Skills referenced anywhere in the tree.
    pub fn referenced_skills(&self) -> Vec<&str> {
        let mut skills = Vec::new();
        self.walk(&mut |p| match p {
            Self::MasteryAtLeast { skill, .. } | Self::Unlocked { skill } => {
                skills.push(skill.as_str())
            }
            _ => {}
        });
        skills
    }
}
