//! In-memory DAG view over a taxonomy snapshot.
//!
//! Uses `petgraph` for the subclass structure and a hash index for O(1)
//! lookups from class id to node and from class id to its declaration.
//! Edges point from parent to child.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::TaxonomyError;

use super::{OClass, TaxonomySnapshot};

/// Read-only graph over one snapshot, valid for the lifetime of the borrow.
///
/// Every id mentioned by a class or an edge gets a node, so edges that point at
/// undeclared classes still participate in traversal. Duplicate edges collapse.
pub struct TaxonomyGraph<'a> {
    graph: DiGraph<&'a str, ()>,
    node_index: HashMap<&'a str, NodeIndex>,
    classes: HashMap<&'a str, &'a OClass>,
    snapshot: &'a TaxonomySnapshot,
}

impl<'a> TaxonomyGraph<'a> {
    /// Build the graph. First declaration wins for duplicated class ids.
    pub fn new(snapshot: &'a TaxonomySnapshot) -> Self {
        let mut graph = DiGraph::new();
        let mut node_index: HashMap<&'a str, NodeIndex> = HashMap::new();
        let mut classes: HashMap<&'a str, &'a OClass> = HashMap::new();

        let mut ensure_node = |graph: &mut DiGraph<&'a str, ()>, id: &'a str| -> NodeIndex {
            *node_index.entry(id).or_insert_with(|| graph.add_node(id))
        };

        for class in &snapshot.o_classes {
            ensure_node(&mut graph, class.id.as_str());
            classes.entry(class.id.as_str()).or_insert(class);
        }
        for edge in &snapshot.subclass_edges {
            let parent = ensure_node(&mut graph, edge.parent_id.as_str());
            let child = ensure_node(&mut graph, edge.child_id.as_str());
            graph.update_edge(parent, child, ());
        }

        Self {
            graph,
            node_index,
            classes,
            snapshot,
        }
    }

    /// The snapshot this graph was built from.
    pub fn snapshot(&self) -> &'a TaxonomySnapshot {
        self.snapshot
    }

    /// Whether `id` is a declared class.
    pub fn contains(&self, id: &str) -> bool {
        self.classes.contains_key(id)
    }

    /// Look up a declared class.
    pub fn class(&self, id: &str) -> Option<&'a OClass> {
        self.classes.get(id).copied()
    }

    /// Look up a declared class, failing with a diagnostic if absent.
    pub fn require_class(&self, id: &str) -> Result<&'a OClass, TaxonomyError> {
        self.class(id)
            .ok_or_else(|| TaxonomyError::UnknownClass { id: id.to_string() })
    }

    /// All declared class ids.
    pub fn class_ids(&self) -> HashSet<&'a str> {
        self.classes.keys().copied().collect()
    }

    /// Number of declared classes.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Root classes, sorted by id.
    ///
    /// Classes flagged `isRoot` if any are flagged, otherwise the structural roots
    /// (declared classes with no incoming subclass edge).
    pub fn roots(&self) -> Vec<&'a OClass> {
        let mut flagged: Vec<&'a OClass> = self
            .classes
            .values()
            .copied()
            .filter(|c| c.is_root == Some(true))
            .collect();

        if flagged.is_empty() {
            flagged = self
                .classes
                .iter()
                .filter(|(id, _)| {
                    let idx = self.node_index[*id];
                    self.graph
                        .neighbors_directed(idx, Direction::Incoming)
                        .next()
                        .is_none()
                })
                .map(|(_, class)| *class)
                .collect();
        }

        flagged.sort_by(|a, b| a.id.cmp(&b.id));
        flagged
    }

    /// Roots restricted to a facet (case-insensitive).
    pub fn roots_with_facet(&self, facet: &str) -> Vec<&'a OClass> {
        self.roots()
            .into_iter()
            .filter(|c| c.has_facet(facet))
            .collect()
    }

    /// Leaf ids reachable from `root_id` along child edges, sorted.
    ///
    /// A visited set guards against cycles: a revisit ends that branch. When no
    /// leaf is reached (the root is itself a leaf, is unknown, or only reaches a
    /// cycle) the root's own id is the sole leaf.
    pub fn leaves_of(&self, root_id: &str) -> Vec<String> {
        let Some(&start) = self.node_index.get(root_id) else {
            return vec![root_id.to_string()];
        };

        let mut leaves: BTreeSet<&'a str> = BTreeSet::new();
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);

        while let Some(node) = queue.pop_front() {
            let mut has_child = false;
            for child in self.graph.neighbors_directed(node, Direction::Outgoing) {
                has_child = true;
                if visited.insert(child) {
                    queue.push_back(child);
                }
            }
            if !has_child {
                leaves.insert(self.graph[node]);
            }
        }

        if leaves.is_empty() {
            return vec![root_id.to_string()];
        }
        leaves.into_iter().map(str::to_string).collect()
    }

    /// Every id reachable from `root_id`, the root included.
    pub fn descendants_of(&self, root_id: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        out.insert(root_id.to_string());
        let Some(&start) = self.node_index.get(root_id) else {
            return out;
        };

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            out.insert(self.graph[node].to_string());
            for child in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        out
    }

    /// Whether the subclass edges contain a cycle (self-loops included).
    pub fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }
}

impl std::fmt::Debug for TaxonomyGraph<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaxonomyGraph")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .field("classes", &self.classes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::SubclassEdge;

    fn scenario_snapshot() -> TaxonomySnapshot {
        TaxonomySnapshot::new(
            vec![
                OClass::new("E_Place").with_facet("Entity").root(),
                OClass::new("E_Restaurant").with_facet("Entity"),
                OClass::new("A_Activity").with_facet("Activity").root(),
                OClass::new("A_Climbing").with_facet("Activity"),
            ],
            vec![
                SubclassEdge::new("E_Place", "E_Restaurant"),
                SubclassEdge::new("A_Activity", "A_Climbing"),
            ],
        )
    }

    #[test]
    fn flagged_roots_take_precedence() {
        let snapshot = scenario_snapshot();
        let graph = TaxonomyGraph::new(&snapshot);
        let ids: Vec<&str> = graph.roots().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["A_Activity", "E_Place"]);

        let activity: Vec<&str> = graph
            .roots_with_facet("activity")
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(activity, vec!["A_Activity"]);
    }

    #[test]
    fn structural_roots_when_none_flagged() {
        let snapshot = TaxonomySnapshot::new(
            vec![OClass::new("Top"), OClass::new("Mid"), OClass::new("Low")],
            vec![SubclassEdge::new("Top", "Mid"), SubclassEdge::new("Mid", "Low")],
        );
        let graph = TaxonomyGraph::new(&snapshot);
        let ids: Vec<&str> = graph.roots().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["Top"]);
    }

    #[test]
    fn cycle_without_flags_has_no_roots() {
        let snapshot = TaxonomySnapshot::new(
            vec![OClass::new("A"), OClass::new("B")],
            vec![SubclassEdge::new("A", "B"), SubclassEdge::new("B", "A")],
        );
        let graph = TaxonomyGraph::new(&snapshot);
        assert!(graph.roots().is_empty());
        assert!(graph.has_cycle());
    }

    #[test]
    fn leaves_exclude_inner_nodes() {
        let snapshot = TaxonomySnapshot::new(
            vec![
                OClass::new("R").root(),
                OClass::new("M"),
                OClass::new("L1"),
                OClass::new("L2"),
                OClass::new("L3"),
            ],
            vec![
                SubclassEdge::new("R", "M"),
                SubclassEdge::new("R", "L1"),
                SubclassEdge::new("M", "L3"),
                SubclassEdge::new("M", "L2"),
            ],
        );
        let graph = TaxonomyGraph::new(&snapshot);
        assert_eq!(graph.leaves_of("R"), vec!["L1", "L2", "L3"]);
        assert_eq!(graph.leaves_of("M"), vec!["L2", "L3"]);
    }

    #[test]
    fn childless_root_is_its_own_leaf() {
        let snapshot = TaxonomySnapshot::new(vec![OClass::new("Solo").root()], vec![]);
        let graph = TaxonomyGraph::new(&snapshot);
        assert_eq!(graph.leaves_of("Solo"), vec!["Solo"]);
        assert_eq!(graph.leaves_of("Missing"), vec!["Missing"]);
    }

    #[test]
    fn leaves_independent_of_edge_order() {
        let forward = scenario_snapshot();
        let mut reversed = forward.clone();
        reversed.subclass_edges.reverse();
        reversed.o_classes.reverse();

        let a = TaxonomyGraph::new(&forward);
        let b = TaxonomyGraph::new(&reversed);
        for root in ["E_Place", "A_Activity"] {
            assert_eq!(a.leaves_of(root), b.leaves_of(root));
            assert_eq!(a.leaves_of(root), a.leaves_of(root));
        }
    }

    #[test]
    fn traversal_terminates_on_cycle() {
        let snapshot = TaxonomySnapshot::new(
            vec![OClass::new("R").root(), OClass::new("A"), OClass::new("B")],
            vec![
                SubclassEdge::new("R", "A"),
                SubclassEdge::new("A", "B"),
                SubclassEdge::new("B", "A"),
            ],
        );
        let graph = TaxonomyGraph::new(&snapshot);
        assert!(graph.has_cycle());
        // Every reachable node has a child, so the root falls back to itself.
        assert_eq!(graph.leaves_of("R"), vec!["R"]);
        assert_eq!(graph.descendants_of("R").len(), 3);
    }

    #[test]
    fn require_class_reports_unknown_id() {
        let snapshot = scenario_snapshot();
        let graph = TaxonomyGraph::new(&snapshot);
        assert!(graph.require_class("E_Place").is_ok());
        assert!(matches!(
            graph.require_class("E_Nope"),
            Err(TaxonomyError::UnknownClass { .. })
        ));
        assert!(!graph.has_cycle());
    }
}
