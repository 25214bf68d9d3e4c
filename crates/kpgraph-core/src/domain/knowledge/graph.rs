//! Read-side graph views: course graphs and integrity reports

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::entity::{EdgeKind, KnowledgePoint};

/// A directed edge `source -> target`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: i64,
    pub target: i64,
    pub kind: EdgeKind,
}

/// Nodes of one course plus every edge leaving them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub course_id: i64,
    pub nodes: Vec<KnowledgePoint>,
    /// Edges may point at nodes of other courses
    pub edges: Vec<GraphEdge>,
}

impl KnowledgeGraph {
    /// Build from a course's nodes; duplicate edges collapse into one
    pub fn from_points(course_id: i64, nodes: Vec<KnowledgePoint>) -> Self {
        let mut seen = HashSet::new();
        let mut edges = Vec::new();

        for node in &nodes {
            for kind in EdgeKind::all() {
                for target in node.edges(*kind) {
                    let edge = GraphEdge {
                        source: node.id,
                        target: *target,
                        kind: *kind,
                    };
                    if seen.insert(edge) {
                        edges.push(edge);
                    }
                }
            }
        }

        Self {
            course_id,
            nodes,
            edges,
        }
    }

    /// Ids of nodes that list `id` as a prerequisite
    pub fn dependents_of(&self, id: i64) -> Vec<i64> {
        self.edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Prerequisite && e.target == id)
            .map(|e| e.source)
            .collect()
    }

    /// Targets outside this course
    pub fn external_targets(&self) -> Vec<i64> {
        let local: HashSet<i64> = self.nodes.iter().map(|n| n.id).collect();
        let mut external: Vec<i64> = self
            .edges
            .iter()
            .map(|e| e.target)
            .filter(|t| !local.contains(t))
            .collect();
        external.sort_unstable();
        external.dedup();
        external
    }

    /// Study order where every in-course prerequisite comes first
    ///
    /// Ties break by id. Returns `None` when prerequisites form a cycle.
    pub fn learning_order(&self) -> Option<Vec<i64>> {
        let local: HashSet<i64> = self.nodes.iter().map(|n| n.id).collect();
        let mut indegree: BTreeMap<i64, usize> = local.iter().map(|id| (*id, 0)).collect();
        let mut unlocks: BTreeMap<i64, Vec<i64>> = BTreeMap::new();

        for edge in &self.edges {
            if edge.kind == EdgeKind::Prerequisite
                && local.contains(&edge.target)
                && edge.source != edge.target
            {
                *indegree.entry(edge.source).or_default() += 1;
                unlocks.entry(edge.target).or_default().push(edge.source);
            }
        }

        let mut ready: VecDeque<i64> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(local.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            if let Some(next) = unlocks.get(&id) {
                let mut newly_ready = Vec::new();
                for source in next {
                    if let Some(d) = indegree.get_mut(source) {
                        *d -= 1;
                        if *d == 0 {
                            newly_ready.push(*source);
                        }
                    }
                }
                newly_ready.sort_unstable();
                ready.extend(newly_ready);
            }
        }

        (order.len() == local.len()).then_some(order)
    }
}

/// A stored reference that breaks a graph invariant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenReference {
    pub source: i64,
    pub target: i64,
    pub kind: EdgeKind,
}

/// Result of scanning stored edge lists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Number of nodes scanned
    pub nodes_checked: usize,
    /// Edges whose target does not exist
    pub dangling: Vec<BrokenReference>,
    /// Edges pointing back at their own node
    pub self_references: Vec<BrokenReference>,
}

impl IntegrityReport {
    /// Scan `points` against the set of ids that exist in the store
    pub fn scan<'a>(
        points: impl IntoIterator<Item = &'a KnowledgePoint>,
        existing: &HashSet<i64>,
    ) -> Self {
        let mut report = Self::default();

        for point in points {
            report.nodes_checked += 1;
            for kind in EdgeKind::all() {
                for target in point.edges(*kind) {
                    let reference = BrokenReference {
                        source: point.id,
                        target: *target,
                        kind: *kind,
                    };
                    if *target == point.id {
                        report.self_references.push(reference);
                    } else if !existing.contains(target) {
                        report.dangling.push(reference);
                    }
                }
            }
        }

        report
    }

    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty() && self.self_references.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::DifficultyLevel;
    use chrono::Utc;

    fn node(id: i64, prerequisites: Vec<i64>, related: Vec<i64>) -> KnowledgePoint {
        KnowledgePoint {
            id,
            name: format!("kp{}", id),
            brief_description: String::new(),
            detailed_content: String::new(),
            course_id: 1,
            course_name: None,
            difficulty: DifficultyLevel::Beginner,
            prerequisite_ids: prerequisites,
            related_ids: related,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_graph_edges_and_dependents() {
        let graph = KnowledgeGraph::from_points(
            1,
            vec![node(1, vec![], vec![]), node(2, vec![1, 1], vec![3]), node(3, vec![1], vec![])],
        );

        assert_eq!(graph.edges.len(), 3);
        assert_eq!(graph.dependents_of(1), vec![2, 3]);
        assert!(graph.external_targets().is_empty());
    }

    #[test]
    fn test_learning_order_puts_prerequisites_first() {
        let graph = KnowledgeGraph::from_points(
            1,
            vec![node(3, vec![2], vec![]), node(2, vec![1, 40], vec![]), node(1, vec![], vec![3])],
        );

        assert_eq!(graph.learning_order(), Some(vec![1, 2, 3]));
        assert_eq!(graph.external_targets(), vec![40]);
    }

    #[test]
    fn test_learning_order_detects_cycles() {
        let graph =
            KnowledgeGraph::from_points(1, vec![node(1, vec![2], vec![]), node(2, vec![1], vec![])]);
        assert_eq!(graph.learning_order(), None);
    }

    #[test]
    fn test_integrity_scan() {
        let points = vec![node(1, vec![1], vec![]), node(2, vec![1, 9], vec![8])];
        let existing: HashSet<i64> = [1, 2].into_iter().collect();

        let report = IntegrityReport::scan(&points, &existing);
        assert_eq!(report.nodes_checked, 2);
        assert_eq!(report.self_references.len(), 1);
        assert_eq!(report.dangling.len(), 2);
        assert!(!report.is_clean());

        let clean = IntegrityReport::scan(&points[1..1], &existing);
        assert!(clean.is_clean());
    }
}
