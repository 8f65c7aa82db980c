//! Read-only skill graph.
//!
//! The graph is an arena of nodes addressed by index, built once by the
//! loader and never mutated. Nodes refer to their prerequisites by index
//! only. A content reload builds a new graph and swaps the shared handle,
//! so concurrent readers need no synchronization.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::predicate::Badge;
use crate::core::progress::StudentProgress;

/// Multiplier used when a skill has no weight for a track.
pub const DEFAULT_TRACK_MULTIPLIER: f64 = 1.0;

/// A validated skill node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillNode {
    /// Unique skill id.
    pub id: String,
    /// XP total required to unlock.
    pub xp_threshold: u64,
    /// Prerequisite ids, de-duplicated, in declared order.
    pub prerequisites: Vec<String>,
    /// Per-track XP multipliers.
    pub track_weights: BTreeMap<String, f64>,
}

/// Immutable skill DAG with track weights and badge definitions.
#[derive(Debug, Clone)]
pub struct SkillGraph {
    nodes: Vec<SkillNode>,
    index: HashMap<String, usize>,
    /// Prerequisite indices per node, parallel to `nodes`.
    edges: Vec<Vec<usize>>,
    /// Node indices, prerequisites before dependents.
    topo: Vec<usize>,
    badges: Vec<Badge>,
    tracks: BTreeSet<String>,
}

impl SkillGraph {
    /// Assemble a graph from parts the loader has already validated.
    ///
    /// `topo` must list every node index with prerequisites first.
    pub(crate) fn from_validated(
        nodes: Vec<SkillNode>,
        topo: Vec<usize>,
        badges: Vec<Badge>,
        tracks: BTreeSet<String>,
    ) -> Self {
        let index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), i))
            .collect();
        let edges = nodes
            .iter()
            .map(|node| {
                node.prerequisites
                    .iter()
                    .filter_map(|p| index.get(p).copied())
                    .collect()
            })
            .collect();
        Self {
            nodes,
            index,
            edges,
            topo,
            badges,
            tracks,
        }
    }

    /// Number of skills.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no skills.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a skill exists.
    pub fn contains(&self, skill_id: &str) -> bool {
        self.index.contains_key(skill_id)
    }

    /// Look up a skill.
    pub fn node(&self, skill_id: &str) -> Option<&SkillNode> {
        self.index.get(skill_id).map(|&i| &self.nodes[i])
    }

    /// Skill ids in topological order.
    pub fn skill_ids(&self) -> impl Iterator<Item = &str> {
        self.topo.iter().map(|&i| self.nodes[i].id.as_str())
    }

    /// Skill ids with every prerequisite before its dependents.
    pub fn topological_order(&self) -> Vec<&str> {
        self.skill_ids().collect()
    }

    /// Direct prerequisites of a skill, or `None` if the skill is unknown.
    pub fn prerequisites_of(&self, skill_id: &str) -> Option<&[String]> {
        self.node(skill_id).map(|node| node.prerequisites.as_slice())
    }

    /// All transitive prerequisites of a skill.
    pub fn ancestors(&self, skill_id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let Some(&start) = self.index.get(skill_id) else {
            return seen;
        };
        let mut stack = self.edges[start].clone();
        while let Some(i) = stack.pop() {
            if seen.insert(self.nodes[i].id.clone()) {
                stack.extend(self.edges[i].iter().copied());
            }
        }
        seen
    }

    /// Configured tracks this graph was validated against.
    pub fn tracks(&self) -> &BTreeSet<String> {
        &self.tracks
    }

    /// Whether `track` is in the configured set.
    pub fn has_track(&self, track: &str) -> bool {
        self.tracks.contains(track)
    }

    /// XP multiplier for a skill on a track.
    pub fn track_multiplier(&self, skill_id: &str, track: &str) -> f64 {
        self.node(skill_id)
            .and_then(|node| node.track_weights.get(track).copied())
            .unwrap_or(DEFAULT_TRACK_MULTIPLIER)
    }

    /// Badge definitions, in course order.
    pub fn badges(&self) -> &[Badge] {
        &self.badges
    }

    /// Whether a skill can be unlocked with the given progress.
    ///
    /// True iff every prerequisite is unlocked and the XP total meets the
    /// threshold. Unknown skills are never eligible.
    pub fn is_unlock_eligible(&self, progress: &StudentProgress, skill_id: &str) -> bool {
        match self.index.get(skill_id) {
            Some(&i) => self.eligible_with(i, progress.xp_total, &progress.unlocked),
            None => false,
        }
    }

    /// Locked skills that are eligible right now, in topological order.
    pub fn next_eligible_nodes(&self, progress: &StudentProgress) -> Vec<String> {
        self.topo
            .iter()
            .copied()
            .filter(|&i| !progress.unlocked.contains(&self.nodes[i].id))
            .filter(|&i| self.eligible_with(i, progress.xp_total, &progress.unlocked))
            .map(|i| self.nodes[i].id.clone())
            .collect()
    }

    /// Every skill that becomes unlocked if eligible skills are unlocked
    /// repeatedly until nothing changes.
    ///
    /// Walks the graph once in topological order, so a skill is only added
    /// after all of its prerequisites are unlocked or added. Does not modify
    /// `progress`.
    pub fn unlock_frontier(&self, progress: &StudentProgress) -> Vec<String> {
        let mut unlocked = progress.unlocked.clone();
        let mut newly = Vec::new();
        for &i in &self.topo {
            let id = &self.nodes[i].id;
            if unlocked.contains(id) {
                continue;
            }
            if self.eligible_with(i, progress.xp_total, &unlocked) {
                unlocked.insert(id.clone());
                newly.push(id.clone());
            }
        }
        newly
    }

    fn eligible_with(&self, i: usize, xp_total: u64, unlocked: &BTreeSet<String>) -> bool {
        xp_total >= self.nodes[i].xp_threshold
            && self.edges[i]
                .iter()
                .all(|&p| unlocked.contains(&self.nodes[p].id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::course::{CourseData, RawSkill};
    use crate::core::loader::load;

    fn tracks() -> BTreeSet<String> {
        ["engineer", "data-scientist"]
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    /// A(0) -> {B(50), C(50)} -> D(120, needs B and C)
    fn diamond() -> SkillGraph {
        let course = CourseData::default()
            .with_skill("A", RawSkill::new(0, &[]))
            .with_skill("B", RawSkill::new(50, &["A"]).with_weight("engineer", 1.25))
            .with_skill("C", RawSkill::new(50, &["A"]))
            .with_skill("D", RawSkill::new(120, &["B", "C"]));
        load(&course, &tracks()).unwrap().0
    }

    fn progress(xp: u64, unlocked: &[&str]) -> StudentProgress {
        let mut p = StudentProgress::new("s1");
        p.xp_total = xp;
        p.unlocked = unlocked.iter().map(|s| s.to_string()).collect();
        p
    }

    #[test]
    fn test_lookup() {
        let graph = diamond();
        assert_eq!(graph.len(), 4);
        assert!(graph.contains("A"));
        assert!(!graph.contains("Z"));
        assert_eq!(graph.node("D").unwrap().xp_threshold, 120);
        assert_eq!(
            graph.prerequisites_of("D").unwrap(),
            &["B".to_string(), "C".to_string()]
        );
        assert!(graph.prerequisites_of("Z").is_none());
    }

    #[test]
    fn test_topological_order() {
        let graph = diamond();
        assert_eq!(graph.topological_order(), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_ancestors() {
        let graph = diamond();
        let ancestors: Vec<String> = graph.ancestors("D").into_iter().collect();
        assert_eq!(ancestors, vec!["A", "B", "C"]);
        assert!(graph.ancestors("A").is_empty());
        assert!(graph.ancestors("Z").is_empty());
    }

    #[test]
    fn test_track_multiplier_defaults_to_one() {
        let graph = diamond();
        assert_eq!(graph.track_multiplier("B", "engineer"), 1.25);
        assert_eq!(graph.track_multiplier("B", "data-scientist"), 1.0);
        assert_eq!(graph.track_multiplier("A", "engineer"), 1.0);
    }

    #[test]
    fn test_is_unlock_eligible() {
        let graph = diamond();
        assert!(graph.is_unlock_eligible(&progress(0, &[]), "A"));
        assert!(!graph.is_unlock_eligible(&progress(100, &[]), "B"));
        assert!(!graph.is_unlock_eligible(&progress(49, &["A"]), "B"));
        assert!(graph.is_unlock_eligible(&progress(50, &["A"]), "B"));
        assert!(!graph.is_unlock_eligible(&progress(500, &["A", "B"]), "D"));
        assert!(graph.is_unlock_eligible(&progress(500, &["A", "B", "C"]), "D"));
        assert!(!graph.is_unlock_eligible(&progress(500, &[]), "Z"));
    }

    #[test]
    fn test_next_eligible_nodes_is_the_frontier() {
        let graph = diamond();
        assert_eq!(graph.next_eligible_nodes(&progress(0, &[])), vec!["A"]);
        assert_eq!(
            graph.next_eligible_nodes(&progress(60, &["A"])),
            vec!["B", "C"]
        );
        // Already unlocked nodes are not part of the frontier
        assert_eq!(
            graph.next_eligible_nodes(&progress(60, &["A", "B"])),
            vec!["C"]
        );
    }

    #[test]
    fn test_unlock_frontier_cascades() {
        let graph = diamond();
        assert_eq!(
            graph.unlock_frontier(&progress(125, &[])),
            vec!["A", "B", "C", "D"]
        );
        assert_eq!(graph.unlock_frontier(&progress(60, &[])), vec!["A", "B", "C"]);
        assert!(graph
            .unlock_frontier(&progress(60, &["A", "B", "C"]))
            .is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Property: every node in the frontier has its prerequisites
            // unlocked before it, in frontier order
            #[test]
            fn prop_frontier_respects_prerequisites(xp in 0u64..300) {
                let graph = diamond();
                let start = progress(xp, &[]);
                let mut unlocked = start.unlocked.clone();
                for id in graph.unlock_frontier(&start) {
                    for prereq in graph.prerequisites_of(&id).unwrap() {
                        prop_assert!(unlocked.contains(prereq));
                    }
                    prop_assert!(xp >= graph.node(&id).unwrap().xp_threshold);
                    unlocked.insert(id);
                }
            }
        }
    }
}
