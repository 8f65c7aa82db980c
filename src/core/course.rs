//! Raw course data as supplied by the course data store.
//!
//! These types mirror the JSON wire format and carry no guarantees; the
//! loader turns them into a validated [`SkillGraph`](crate::core::SkillGraph).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::predicate::Badge;
use crate::error::{ArborError, Result};
use crate::util::read_to_string_limited;

/// A full course description.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseData {
    /// Skill definitions keyed by stable skill id.
    #[serde(default)]
    pub skills: BTreeMap<String, RawSkill>,
    /// Badge definitions.
    #[serde(default)]
    pub badges: Vec<Badge>,
}

/// One skill as written in course data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawSkill {
    /// Prerequisite skill ids, in declared order.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// XP needed to unlock. Signed so negative values can be reported.
    #[serde(default)]
    pub xp_threshold: i64,
    /// Per-track XP multipliers. Tracks not listed use 1.0.
    #[serde(default)]
    pub track_weights: BTreeMap<String, f64>,
}

impl RawSkill {
    /// Create a skill with the given threshold and prerequisites.
    pub fn new(xp_threshold: i64, prerequisites: &[&str]) -> Self {
        Self {
            prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
            xp_threshold,
            track_weights: BTreeMap::new(),
        }
    }

    /// Add a track weight.
    pub fn with_weight(mut self, track: impl Into<String>, weight: f64) -> Self {
        self.track_weights.insert(track.into(), weight);
        self
    }
}

impl CourseData {
    /// Parse course data from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ArborError::serde(format!("invalid course data: {}", e)))
    }

    /// Add or replace a skill.
    pub fn with_skill(mut self, id: impl Into<String>, skill: RawSkill) -> Self {
        self.skills.insert(id.into(), skill);
        self
    }

    /// Append a badge definition.
    pub fn with_badge(mut self, badge: Badge) -> Self {
        self.badges.push(badge);
        self
    }
}

/// Read and parse a course data file.
pub fn load_course_file(path: &Path) -> Result<CourseData> {
    let content = read_to_string_limited(path)?;
    CourseData::from_json(&content)
}
