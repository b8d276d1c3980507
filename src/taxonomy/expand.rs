//! Subtree expansion: root id → bounded leaf views, cached per request.
//!
//! Roots are frequently shared by many concepts in one request, so each root is
//! traversed at most once. Results are ordered by id and capped; the cap is an
//! approximation that keeps the leaf query bounded, and truncation is recorded
//! on the [`Expansion`] so callers can report it.

use std::collections::{BTreeMap, HashMap};

use super::ClassView;
use super::graph::TaxonomyGraph;

/// Leaf views of one root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    /// Leaf views in id order, at most `cap` entries.
    pub leaves: Vec<ClassView>,
    /// Leaves present in the class index before the cap was applied.
    pub total: usize,
}

impl Expansion {
    /// Whether leaves were cut off by the cap.
    pub fn is_truncated(&self) -> bool {
        self.total > self.leaves.len()
    }

    /// Iterate over the leaf ids.
    pub fn leaf_ids(&self) -> impl Iterator<Item = &str> {
        self.leaves.iter().map(|v| v.id.as_str())
    }
}

/// Request-scoped expansion cache over a [`TaxonomyGraph`].
pub struct SubtreeExpander<'g, 'a> {
    graph: &'g TaxonomyGraph<'a>,
    cap: usize,
    cache: HashMap<String, Expansion>,
}

impl<'g, 'a> SubtreeExpander<'g, 'a> {
    pub fn new(graph: &'g TaxonomyGraph<'a>, cap: usize) -> Self {
        Self {
            graph,
            cap,
            cache: HashMap::new(),
        }
    }

    /// Expand `root_id`, traversing only on first use.
    ///
    /// Leaf ids that are not declared classes (dangling edge targets, unknown
    /// roots) yield no view, so an unknown root expands to nothing.
    pub fn expand(&mut self, root_id: &str) -> &Expansion {
        if !self.cache.contains_key(root_id) {
            let views: Vec<ClassView> = self
                .graph
                .leaves_of(root_id)
                .iter()
                .filter_map(|id| self.graph.class(id))
                .map(|class| class.view())
                .collect();
            let total = views.len();
            let leaves: Vec<ClassView> = views.into_iter().take(self.cap).collect();

            tracing::debug!(root = root_id, total, kept = leaves.len(), "expanded root");
            self.cache
                .insert(root_id.to_string(), Expansion { leaves, total });
        }
        &self.cache[root_id]
    }

    /// Number of distinct roots expanded so far.
    pub fn expanded_count(&self) -> usize {
        self.cache.len()
    }

    /// Consume the cache into the `rootSubtrees` payload, omitting empty roots.
    pub fn into_subtrees(self) -> BTreeMap<String, Vec<ClassView>> {
        self.cache
            .into_iter()
            .filter(|(_, e)| !e.leaves.is_empty())
            .map(|(root, e)| (root, e.leaves))
            .collect()
    }
}
