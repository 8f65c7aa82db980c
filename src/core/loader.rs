//! Course loader and validator.
//!
//! Turns raw [`CourseData`] into an immutable [`SkillGraph`]. Every check
//! runs to completion so a failed load names every violation, not just the
//! first one found.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::course::CourseData;
use crate::core::graph::{SkillGraph, SkillNode};
use crate::core::predicate::{Badge, Predicate};
use crate::error::{ArborError, Result};

/// A single problem found in course data.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    #[error("skill '{skill}' requires unknown skill '{missing}'")]
    DanglingPrerequisite { skill: String, missing: String },

    /// Members in traversal order; the first member closes the loop.
    #[error("prerequisite cycle: {}", format_cycle(.members))]
    Cycle { members: Vec<String> },

    #[error("skill '{skill}' has negative XP threshold {threshold}")]
    NegativeThreshold { skill: String, threshold: i64 },

    #[error("skill '{skill}' has non-positive weight {weight} for track '{track}'")]
    NonPositiveWeight {
        skill: String,
        track: String,
        weight: f64,
    },

    #[error("skill '{skill}' weights unknown track '{track}'")]
    UnknownTrack { skill: String, track: String },

    #[error("badge '{badge}' is defined more than once")]
    DuplicateBadge { badge: String },

    #[error("badge '{badge}' references unknown skill '{skill}'")]
    BadgeUnknownSkill { badge: String, skill: String },

    #[error("badge '{badge}' has mastery percent {percent} outside 0-100")]
    BadgeInvalidPercent { badge: String, percent: f64 },

    #[error(
        "skill '{skill}' needs {threshold} XP, not more than prerequisite \
         '{prerequisite}' ({prerequisite_threshold} XP)"
    )]
    ThresholdNotIncreasing {
        skill: String,
        threshold: u64,
        prerequisite: String,
        prerequisite_threshold: u64,
    },

    #[error("skill '{skill}' lists prerequisite '{prerequisite}' more than once")]
    DuplicatePrerequisite { skill: String, prerequisite: String },

    #[error("badge '{badge}' has an empty 'any' group and can never be earned")]
    EmptyPredicateGroup { badge: String },
}

fn format_cycle(members: &[String]) -> String {
    let mut text = members.join(" -> ");
    if let Some(first) = members.first() {
        text.push_str(" -> ");
        text.push_str(first);
    }
    text
}

/// Everything the validator found.
///
/// Errors make the load fail. Warnings are reported but the graph is
/// still built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<Violation>,
    pub warnings: Vec<Violation>,
}

impl ValidationReport {
    /// Whether any fatal violation was found.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether nothing at all was found.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            writeln!(f, "  error: {}", error)?;
        }
        for warning in &self.warnings {
            writeln!(f, "  warning: {}", warning)?;
        }
        Ok(())
    }
}

/// Validate course data and build the skill graph.
///
/// `tracks` is the configured set of track names that weight tables may
/// refer to. On success the returned report holds warnings only.
///
/// # Errors
///
/// Returns [`ArborError::Validation`] carrying every error and warning if
/// any check fails.
pub fn load(
    course: &CourseData,
    tracks: &BTreeSet<String>,
) -> Result<(SkillGraph, ValidationReport)> {
    let mut report = ValidationReport::default();

    // Skills are iterated in id order, so node index order is id order
    let index: HashMap<&str, usize> = course
        .skills
        .keys()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut nodes = Vec::with_capacity(course.skills.len());
    for (id, raw) in &course.skills {
        let mut prerequisites: Vec<String> = Vec::with_capacity(raw.prerequisites.len());
        for prereq in &raw.prerequisites {
            if prerequisites.contains(prereq) {
                report.warnings.push(Violation::DuplicatePrerequisite {
                    skill: id.clone(),
                    prerequisite: prereq.clone(),
                });
                continue;
            }
            if !index.contains_key(prereq.as_str()) {
                report.errors.push(Violation::DanglingPrerequisite {
                    skill: id.clone(),
                    missing: prereq.clone(),
                });
            }
            prerequisites.push(prereq.clone());
        }

        if raw.xp_threshold < 0 {
            report.errors.push(Violation::NegativeThreshold {
                skill: id.clone(),
                threshold: raw.xp_threshold,
            });
        }

        for (track, &weight) in &raw.track_weights {
            if !tracks.contains(track) {
                report.errors.push(Violation::UnknownTrack {
                    skill: id.clone(),
                    track: track.clone(),
                });
            }
            if !(weight > 0.0 && weight.is_finite()) {
                report.errors.push(Violation::NonPositiveWeight {
                    skill: id.clone(),
                    track: track.clone(),
                    weight,
                });
            }
        }

        nodes.push(SkillNode {
            id: id.clone(),
            xp_threshold: u64::try_from(raw.xp_threshold).unwrap_or(0),
            prerequisites,
            track_weights: raw.track_weights.clone(),
        });
    }

    let edges = resolve_edges(&nodes, &index);

    for cycle in CycleFinder::new(&edges).run() {
        report.errors.push(Violation::Cycle {
            members: cycle.into_iter().map(|i| nodes[i].id.clone()).collect(),
        });
    }

    check_thresholds(&nodes, &edges, &mut report);
    check_badges(&course.badges, &index, &mut report);

    for warning in &report.warnings {
        warn!(%warning, "course validation warning");
    }

    if report.has_errors() {
        return Err(ArborError::validation(report));
    }

    let topo = topological_order(&edges);
    debug!(
        skills = nodes.len(),
        badges = course.badges.len(),
        warnings = report.warnings.len(),
        "loaded skill graph"
    );

    let graph = SkillGraph::from_validated(nodes, topo, course.badges.clone(), tracks.clone());
    Ok((graph, report))
}

/// Prerequisite indices per node, dropping dangling references.
fn resolve_edges(nodes: &[SkillNode], index: &HashMap<&str, usize>) -> Vec<Vec<usize>> {
    nodes
        .iter()
        .map(|node| {
            node.prerequisites
                .iter()
                .filter_map(|p| index.get(p.as_str()).copied())
                .collect()
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    InProgress,
    Done,
}

/// Three-color DFS over prerequisite edges.
struct CycleFinder<'a> {
    edges: &'a [Vec<usize>],
    color: Vec<Color>,
    path: Vec<usize>,
    cycles: Vec<Vec<usize>>,
    seen: HashSet<Vec<usize>>,
}

impl<'a> CycleFinder<'a> {
    fn new(edges: &'a [Vec<usize>]) -> Self {
        Self {
            edges,
            color: vec![Color::Unvisited; edges.len()],
            path: Vec::new(),
            cycles: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn run(mut self) -> Vec<Vec<usize>> {
        for start in 0..self.edges.len() {
            if self.color[start] == Color::Unvisited {
                self.visit(start);
            }
        }
        self.cycles
    }

    fn visit(&mut self, node: usize) {
        self.color[node] = Color::InProgress;
        self.path.push(node);

        let edges = self.edges;
        for &next in &edges[node] {
            match self.color[next] {
                Color::Unvisited => self.visit(next),
                Color::InProgress => self.record_cycle(next),
                Color::Done => {}
            }
        }

        self.path.pop();
        self.color[node] = Color::Done;
    }

    fn record_cycle(&mut self, back_to: usize) {
        let Some(pos) = self.path.iter().position(|&n| n == back_to) else {
            return;
        };
        let cycle = self.path[pos..].to_vec();
        let mut key = cycle.clone();
        key.sort_unstable();
        if self.seen.insert(key) {
            self.cycles.push(cycle);
        }
    }
}

fn check_thresholds(nodes: &[SkillNode], edges: &[Vec<usize>], report: &mut ValidationReport) {
    for (i, node) in nodes.iter().enumerate() {
        for &p in &edges[i] {
            if p == i {
                continue;
            }
            let prereq = &nodes[p];
            if node.xp_threshold <= prereq.xp_threshold {
                report.warnings.push(Violation::ThresholdNotIncreasing {
                    skill: node.id.clone(),
                    threshold: node.xp_threshold,
                    prerequisite: prereq.id.clone(),
                    prerequisite_threshold: prereq.xp_threshold,
                });
            }
        }
    }
}

fn check_badges(badges: &[Badge], index: &HashMap<&str, usize>, report: &mut ValidationReport) {
    let mut ids = HashSet::new();
    for badge in badges {
        if !ids.insert(badge.id.as_str()) {
            report.errors.push(Violation::DuplicateBadge {
                badge: badge.id.clone(),
            });
        }

        for skill in badge.predicate.referenced_skills() {
            if !index.contains_key(skill) {
                report.errors.push(Violation::BadgeUnknownSkill {
                    badge: badge.id.clone(),
                    skill: skill.to_string(),
                });
            }
        }

        badge.predicate.walk(&mut |term| match term {
            Predicate::MasteryAtLeast { percent, .. } if !(0.0..=100.0).contains(percent) => {
                report.errors.push(Violation::BadgeInvalidPercent {
                    badge: badge.id.clone(),
                    percent: *percent,
                });
            }
            Predicate::Any { of } if of.is_empty() => {
                report.warnings.push(Violation::EmptyPredicateGroup {
                    badge: badge.id.clone(),
                });
            }
            _ => {}
        });
    }
}

/// Kahn's algorithm over an acyclic edge list. Ready nodes are taken
/// lowest index first, which is lowest skill id first.
fn topological_order(edges: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = edges.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); edges.len()];
    for (node, prereqs) in edges.iter().enumerate() {
        for &p in prereqs {
            dependents[p].push(node);
        }
    }

    let mut ready: BTreeSet<usize> = (0..edges.len()).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(edges.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &dependent in &dependents[node] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::course::RawSkill;

    fn tracks() -> BTreeSet<String> {
        ["engineer", "data-scientist"]
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    fn report_of(course: &CourseData) -> ValidationReport {
        match load(course, &tracks()) {
            Err(ArborError::Validation { report }) => report,
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected validation failure"),
        }
    }

    #[test]
    fn test_valid_course_loads() {
        let course = CourseData::default()
            .with_skill("A", RawSkill::new(0, &[]))
            .with_skill("B", RawSkill::new(50, &["A"]).with_weight("engineer", 1.25))
            .with_skill("C", RawSkill::new(60, &["A"]));

        let (graph, report) = load(&course, &tracks()).unwrap();
        assert_eq!(graph.len(), 3);
        assert!(report.is_clean());
        assert_eq!(graph.topological_order(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_cycle_names_members() {
        let course = CourseData::default()
            .with_skill("A", RawSkill::new(0, &["C"]))
            .with_skill("B", RawSkill::new(10, &["A"]))
            .with_skill("C", RawSkill::new(20, &["B"]));

        let report = report_of(&course);
        let cycles: Vec<&Violation> = report
            .errors
            .iter()
            .filter(|v| matches!(v, Violation::Cycle { .. }))
            .collect();
        assert_eq!(cycles.len(), 1);
        let Violation::Cycle { members } = cycles[0] else {
            unreachable!()
        };
        let mut sorted = members.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["A", "B", "C"]);
        assert_eq!(cycles[0].to_string(), "prerequisite cycle: A -> C -> B -> A");
    }

    #[test]
    fn test_self_prerequisite_is_cycle() {
        let course = CourseData::default().with_skill("A", RawSkill::new(0, &["A"]));
        let report = report_of(&course);
        assert_eq!(
            report.errors,
            vec![Violation::Cycle {
                members: vec!["A".to_string()]
            }]
        );
    }

    #[test]
    fn test_every_violation_is_reported() {
        let course = CourseData::default()
            .with_skill("A", RawSkill::new(-5, &[]).with_weight("wizard", 2.0))
            .with_skill("B", RawSkill::new(10, &["A", "X"]).with_weight("engineer", 0.0))
            .with_skill("C", RawSkill::new(10, &["Y"]))
            .with_badge(Badge::new("dup", Predicate::unlocked("A")))
            .with_badge(Badge::new("dup", Predicate::mastery_at_least("Z", 150.0)));

        let report = report_of(&course);
        let expected = [
            Violation::NegativeThreshold {
                skill: "A".to_string(),
                threshold: -5,
            },
            Violation::UnknownTrack {
                skill: "A".to_string(),
                track: "wizard".to_string(),
            },
            Violation::DanglingPrerequisite {
                skill: "B".to_string(),
                missing: "X".to_string(),
            },
            Violation::NonPositiveWeight {
                skill: "B".to_string(),
                track: "engineer".to_string(),
                weight: 0.0,
            },
            Violation::DanglingPrerequisite {
                skill: "C".to_string(),
                missing: "Y".to_string(),
            },
            Violation::DuplicateBadge {
                badge: "dup".to_string(),
            },
            Violation::BadgeUnknownSkill {
                badge: "dup".to_string(),
                skill: "Z".to_string(),
            },
            Violation::BadgeInvalidPercent {
                badge: "dup".to_string(),
                percent: 150.0,
            },
        ];
        for violation in &expected {
            assert!(
                report.errors.contains(violation),
                "missing {violation:?} in {report:?}"
            );
        }
        assert_eq!(report.errors.len(), expected.len());
    }

    #[test]
    fn test_non_increasing_threshold_is_warning() {
        let course = CourseData::default()
            .with_skill("A", RawSkill::new(100, &[]))
            .with_skill("B", RawSkill::new(40, &["A"]));

        let (graph, report) = load(&course, &tracks()).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(!report.has_errors());
        assert_eq!(
            report.warnings,
            vec![Violation::ThresholdNotIncreasing {
                skill: "B".to_string(),
                threshold: 40,
                prerequisite: "A".to_string(),
                prerequisite_threshold: 100,
            }]
        );
    }

    #[test]
    fn test_duplicate_prerequisite_is_deduplicated() {
        let course = CourseData::default()
            .with_skill("A", RawSkill::new(0, &[]))
            .with_skill("B", RawSkill::new(10, &["A", "A"]));

        let (graph, report) = load(&course, &tracks()).unwrap();
        assert_eq!(graph.prerequisites_of("B").unwrap(), &["A".to_string()]);
        assert!(matches!(
            report.warnings.as_slice(),
            [Violation::DuplicatePrerequisite { .. }]
        ));
    }

    #[test]
    fn test_empty_any_group_is_warning() {
        let course = CourseData::default()
            .with_skill("A", RawSkill::new(0, &[]))
            .with_badge(Badge::new("never", Predicate::any(vec![])));

        let (_, report) = load(&course, &tracks()).unwrap();
        assert_eq!(
            report.warnings,
            vec![Violation::EmptyPredicateGroup {
                badge: "never".to_string()
            }]
        );
    }

    #[test]
    fn test_badge_skills_checked_in_nested_groups() {
        let course = CourseData::default()
            .with_skill("A", RawSkill::new(0, &[]))
            .with_badge(Badge::new(
                "deep",
                Predicate::all(vec![
                    Predicate::unlocked("A"),
                    Predicate::any(vec![
                        Predicate::mastery_at_least("Ghost", 50.0),
                        Predicate::unlocked("Phantom"),
                    ]),
                ]),
            ));

        assert_eq!(
            report_of(&course).errors,
            vec![
                Violation::BadgeUnknownSkill {
                    badge: "deep".to_string(),
                    skill: "Ghost".to_string(),
                },
                Violation::BadgeUnknownSkill {
                    badge: "deep".to_string(),
                    skill: "Phantom".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_topological_order_ties_by_id() {
        let course = CourseData::default()
            .with_skill("z-root", RawSkill::new(0, &[]))
            .with_skill("a-leaf", RawSkill::new(10, &["z-root"]))
            .with_skill("m-root", RawSkill::new(0, &[]));

        let (graph, _) = load(&course, &tracks()).unwrap();
        assert_eq!(
            graph.topological_order(),
            vec!["m-root", "z-root", "a-leaf"]
        );
    }

    #[test]
    fn test_report_display_is_itemized() {
        let report = ValidationReport {
            errors: vec![Violation::DuplicateBadge {
                badge: "b".to_string(),
            }],
            warnings: vec![Violation::DuplicatePrerequisite {
                skill: "B".to_string(),
                prerequisite: "A".to_string(),
            }],
        };
        let text = report.to_string();
        assert!(text.contains("error: badge 'b' is defined more than once"));
        assert!(text.contains("warning: skill 'B' lists prerequisite 'A' more than once"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Property: a chain closed back onto its head is always rejected
            #[test]
            fn prop_injected_cycle_is_rejected(len in 1usize..8) {
                let mut course = CourseData::default();
                for i in 0..len {
                    let prev = format!("s{}", (i + len - 1) % len);
                    course = course.with_skill(format!("s{i}"), RawSkill::new(i as i64, &[prev.as_str()]));
                }
                let result = load(&course, &tracks());
                let is_cycle_error = matches!(
                    &result,
                    Err(ArborError::Validation { report })
                        if report.errors.iter().any(|v| matches!(v, Violation::Cycle { members } if members.len() == len))
                );
                prop_assert!(is_cycle_error);
            }

            // Property: an acyclic chain always loads with prerequisites first
            #[test]
            fn prop_chain_topo_order(len in 1usize..10) {
                let mut course = CourseData::default();
                for i in 0..len {
                    let prereqs: Vec<String> = if i == 0 { vec![] } else { vec![format!("s{:02}", i - 1)] };
                    let refs: Vec<&str> = prereqs.iter().map(String::as_str).collect();
                    course = course.with_skill(format!("s{:02}", i), RawSkill::new(i as i64 * 10, &refs));
                }
                let (graph, report) = load(&course, &tracks()).unwrap();
                prop_assert!(report.is_clean());
                let order = graph.topological_order();
                for (pos, id) in order.iter().enumerate() {
                    for prereq in graph.prerequisites_of(id).unwrap() {
                        let prereq_pos = order.iter().position(|o| o == prereq).unwrap();
                        prop_assert!(prereq_pos < pos);
                    }
                }
            }
        }
    }
}
