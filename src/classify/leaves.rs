//! Leaf classification: expand the selected roots into candidate leaves and
//! build the bounded leaf query.
//!
//! Each item's candidate set is the union of the expanded leaves of its
//! selected roots. The set is what the oracle is told to choose from and what
//! the validator later holds it to.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::oracle::{ConceptCandidates, EventCandidates, LeafClassificationQuery};
use crate::taxonomy::ClassView;
use crate::taxonomy::expand::SubtreeExpander;
use crate::taxonomy::graph::TaxonomyGraph;

use super::roots::RootSelection;
use super::{ClassifyRequest, Issue};

/// Selected roots and the leaves they expand to, for one item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemCandidates {
    /// Selected root ids in rank order.
    pub roots: Vec<String>,
    /// Allowed leaf ids.
    pub leaves: BTreeSet<String>,
}

/// Per-item candidate sets plus the shared `rootSubtrees` payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatePlan {
    /// Concept key → candidates. Concepts without leaves are absent.
    pub concepts: BTreeMap<String, ItemCandidates>,
    /// Event candidates, absent when the event has no roots or no leaves.
    pub event: Option<ItemCandidates>,
    pub subtrees: BTreeMap<String, Vec<ClassView>>,
    pub warnings: Vec<Issue>,
}

impl CandidatePlan {
    /// Expand every implicated root once and assemble per-item candidates.
    pub fn build(graph: &TaxonomyGraph<'_>, selection: &RootSelection, cap: usize) -> Self {
        let mut expander = SubtreeExpander::new(graph, cap);
        let mut reported: HashSet<String> = HashSet::new();
        let mut warnings = Vec::new();

        let mut collect = |root_ids: Vec<String>, warnings: &mut Vec<Issue>| -> ItemCandidates {
            let mut leaves = BTreeSet::new();
            for root_id in &root_ids {
                let expansion = expander.expand(root_id);
                leaves.extend(expansion.leaf_ids().map(str::to_string));

                if !reported.insert(root_id.clone()) {
                    continue;
                }
                if expansion.leaves.is_empty() {
                    warnings.push(
                        Issue::validation("no leaf candidates for root")
                            .with("rootId", root_id.as_str()),
                    );
                } else if expansion.is_truncated() {
                    warnings.push(
                        Issue::validation("leaf candidates truncated for root")
                            .with("rootId", root_id.as_str())
                            .with("leafCount", expansion.total)
                            .with("cap", cap),
                    );
                }
            }
            ItemCandidates {
                roots: root_ids,
                leaves,
            }
        };

        let mut concepts = BTreeMap::new();
        for (key, roots) in &selection.concept_roots {
            let ids = roots.iter().map(|r| r.o_class_id.clone()).collect();
            let item = collect(ids, &mut warnings);
            if item.leaves.is_empty() {
                warnings.push(
                    Issue::validation("no leaf candidates for concept")
                        .with("conceptKey", key.as_str()),
                );
                continue;
            }
            concepts.insert(key.clone(), item);
        }

        let event = if selection.event_roots.is_empty() {
            None
        } else {
            let ids = selection
                .event_roots
                .iter()
                .map(|r| r.o_class_id.clone())
                .collect();
            let item = collect(ids, &mut warnings);
            if item.leaves.is_empty() {
                warnings.push(Issue::validation("no leaf candidates for event"));
                None
            } else {
                Some(item)
            }
        };

        let subtrees = expander.into_subtrees();
        tracing::debug!(
            concepts = concepts.len(),
            event = event.is_some(),
            roots = subtrees.len(),
            "candidate leaves expanded"
        );

        Self {
            concepts,
            event,
            subtrees,
            warnings,
        }
    }

    /// Whether nothing is left to ask the oracle about.
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.event.is_none()
    }

    /// Candidates for a concept key, if it takes part in the leaf query.
    pub fn concept(&self, concept_key: &str) -> Option<&ItemCandidates> {
        self.concepts.get(concept_key)
    }

    /// Build the leaf query. Concepts keep request order; repeated keys are
    /// sent once.
    pub fn query(&self, request: &ClassifyRequest) -> LeafClassificationQuery {
        let mut seen: HashSet<&str> = HashSet::new();
        let concepts = request
            .scoped_concepts()
            .iter()
            .filter(|c| seen.insert(c.concept_key.as_str()))
            .filter_map(|c| {
                self.concepts.get(&c.concept_key).map(|item| ConceptCandidates {
                    sample: c.clone(),
                    root_candidates: item.leaves.iter().cloned().collect(),
                })
            })
            .collect();

        let event = self.event.as_ref().map(|item| EventCandidates {
            title: request.event_title.clone(),
            normalized_text_en: request.event_normalized_text_en.clone(),
            root_candidates: item.leaves.iter().cloned().collect(),
        });

        LeafClassificationQuery {
            mode: request.mode,
            scope: request.scope,
            concepts,
            event,
            root_subtrees: self.subtrees.clone(),
        }
    }
}
