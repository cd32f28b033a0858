//! The precedence graph over reactions: a DAG whose edges encode
//! "must fire before".

use std::collections::{BTreeMap, BTreeSet};

use gyre_core::keys::{PortKey, ReactionKey};
use petgraph::prelude::DiGraphMap;
use slotmap::SecondaryMap;

use crate::error::RuntimeError;

/// Execution level
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Level(pub usize);

impl std::fmt::Debug for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl std::ops::Add<usize> for Level {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// Why a precedence edge exists; used for diagnostics output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeCause {
    /// Intra-reactor registration order
    Priority,
    /// A dataflow dependency through this port
    Port(PortKey),
}

#[derive(Default)]
pub struct DepGraph {
    graph: DiGraphMap<ReactionKey, EdgeCause>,
    levels: SecondaryMap<ReactionKey, Level>,
}

impl std::fmt::Debug for DepGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepGraph")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

impl DepGraph {
    pub fn add_node(&mut self, key: ReactionKey) {
        self.graph.add_node(key);
        self.levels.insert(key, Level::default());
    }

    pub fn remove_node(&mut self, key: ReactionKey) {
        self.graph.remove_node(key);
        self.levels.remove(key);
    }

    pub fn contains_node(&self, key: ReactionKey) -> bool {
        self.graph.contains_node(key)
    }

    /// Add the edge `a -> b` ("a must fire before b"), failing with
    /// [`RuntimeError::CycleIntroduced`] if it would close a cycle. The graph
    /// is left untouched on failure.
    pub fn add_edge(
        &mut self,
        a: ReactionKey,
        b: ReactionKey,
        cause: EdgeCause,
    ) -> Result<(), RuntimeError> {
        if self.would_introduce_cycle(a, b) {
            return Err(RuntimeError::CycleIntroduced {
                what: format!("{a} -> {b}"),
            });
        }
        self.graph.add_edge(a, b, cause);
        Ok(())
    }

    /// Add an edge without the cycle test; used when rebuilding from a
    /// validated model where `relevel` performs the final acyclicity check.
    pub(crate) fn add_edge_unchecked(&mut self, a: ReactionKey, b: ReactionKey, cause: EdgeCause) {
        self.graph.add_edge(a, b, cause);
    }

    pub fn remove_edge(&mut self, a: ReactionKey, b: ReactionKey) {
        self.graph.remove_edge(a, b);
    }

    /// Reachability from `a` to `b` along directed edges.
    pub fn has_path(&self, a: ReactionKey, b: ReactionKey) -> bool {
        if !self.graph.contains_node(a) || !self.graph.contains_node(b) {
            return false;
        }
        petgraph::algo::has_path_connecting(&self.graph, a, b, None)
    }

    /// True iff adding `a -> b` would close a cycle: a BFS from `b` reaches `a`.
    pub fn would_introduce_cycle(&self, a: ReactionKey, b: ReactionKey) -> bool {
        a == b || self.has_path(b, a)
    }

    /// Check whether the graph would stay acyclic with all of `edges` added.
    pub(crate) fn edges_admissible(&self, edges: &[(ReactionKey, ReactionKey)]) -> bool {
        let mut probe = self.graph.clone();
        for &(a, b) in edges {
            probe.add_edge(a, b, EdgeCause::Priority);
        }
        !petgraph::algo::is_cyclic_directed(&probe)
    }

    /// Assign topological levels by Kahn's algorithm: nodes with no
    /// remaining predecessors form level 0, successors sit at
    /// `max(predecessor level) + 1`.
    pub fn topological_levels(&mut self) -> Result<(), RuntimeError> {
        let mut indegree: BTreeMap<ReactionKey, usize> =
            self.graph.nodes().map(|n| (n, 0)).collect();
        for (_, b, _) in self.graph.all_edges() {
            *indegree.get_mut(&b).expect("edge endpoint not a node") += 1;
        }

        let mut ready: BTreeSet<ReactionKey> = indegree
            .iter()
            .filter_map(|(&n, &d)| (d == 0).then_some(n))
            .collect();

        let mut levels = SecondaryMap::with_capacity(indegree.len());
        for node in self.graph.nodes() {
            levels.insert(node, Level::default());
        }

        let mut processed = 0usize;
        while let Some(node) = ready.pop_first() {
            processed += 1;
            let level = levels[node];
            for succ in self
                .graph
                .neighbors_directed(node, petgraph::Direction::Outgoing)
            {
                if levels[succ] < level + 1 {
                    levels[succ] = level + 1;
                }
                let d = indegree.get_mut(&succ).expect("successor not a node");
                *d -= 1;
                if *d == 0 {
                    ready.insert(succ);
                }
            }
        }

        if processed != self.graph.node_count() {
            return Err(RuntimeError::CycleIntroduced {
                what: "reaction graph is not acyclic".into(),
            });
        }

        self.levels = levels;
        Ok(())
    }

    pub fn level(&self, key: ReactionKey) -> Level {
        self.levels.get(key).copied().unwrap_or_default()
    }

    pub fn max_level(&self) -> Level {
        self.levels.values().copied().max().unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edges(&self) -> impl Iterator<Item = (ReactionKey, ReactionKey, EdgeCause)> + '_ {
        self.graph.all_edges().map(|(a, b, c)| (a, b, *c))
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    fn keys(n: usize) -> Vec<ReactionKey> {
        let mut map: SlotMap<ReactionKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_cycle_rejected() {
        let k = keys(3);
        let mut g = DepGraph::default();
        for &key in &k {
            g.add_node(key);
        }
        g.add_edge(k[0], k[1], EdgeCause::Priority).unwrap();
        g.add_edge(k[1], k[2], EdgeCause::Priority).unwrap();
        assert!(g.would_introduce_cycle(k[2], k[0]));
        assert!(matches!(
            g.add_edge(k[2], k[0], EdgeCause::Priority),
            Err(RuntimeError::CycleIntroduced { .. })
        ));
        // graph unchanged: the forward path is intact, the back edge absent
        assert!(g.has_path(k[0], k[2]));
        assert!(!g.has_path(k[2], k[0]));
    }

    #[test]
    fn test_self_edge_rejected() {
        let k = keys(1);
        let mut g = DepGraph::default();
        g.add_node(k[0]);
        assert!(matches!(
            g.add_edge(k[0], k[0], EdgeCause::Priority),
            Err(RuntimeError::CycleIntroduced { .. })
        ));
    }

    #[test]
    fn test_levels() {
        // diamond: 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3
        let k = keys(4);
        let mut g = DepGraph::default();
        for &key in &k {
            g.add_node(key);
        }
        g.add_edge(k[0], k[1], EdgeCause::Priority).unwrap();
        g.add_edge(k[0], k[2], EdgeCause::Priority).unwrap();
        g.add_edge(k[1], k[3], EdgeCause::Priority).unwrap();
        g.add_edge(k[2], k[3], EdgeCause::Priority).unwrap();
        g.topological_levels().unwrap();
        assert_eq!(g.level(k[0]), Level(0));
        assert_eq!(g.level(k[1]), Level(1));
        assert_eq!(g.level(k[2]), Level(1));
        assert_eq!(g.level(k[3]), Level(2));
        assert_eq!(g.max_level(), Level(2));
    }

    #[test]
    fn test_relevel_after_removal() {
        let k = keys(3);
        let mut g = DepGraph::default();
        for &key in &k {
            g.add_node(key);
        }
        g.add_edge(k[0], k[1], EdgeCause::Priority).unwrap();
        g.add_edge(k[1], k[2], EdgeCause::Priority).unwrap();
        g.topological_levels().unwrap();
        assert_eq!(g.level(k[2]), Level(2));

        g.remove_edge(k[0], k[1]);
        g.topological_levels().unwrap();
        assert_eq!(g.level(k[1]), Level(0));
        assert_eq!(g.level(k[2]), Level(1));
    }

    #[test]
    fn test_edges_admissible() {
        let k = keys(2);
        let mut g = DepGraph::default();
        for &key in &k {
            g.add_node(key);
        }
        g.add_edge(k[0], k[1], EdgeCause::Priority).unwrap();
        assert!(g.edges_admissible(&[(k[0], k[1])]));
        assert!(!g.edges_admissible(&[(k[1], k[0])]));
    }
}
