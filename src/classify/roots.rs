//! Root selection: narrow each concept and the event to a few plausible roots.
//!
//! The oracle sees root classes only. Its raw candidates are then filtered per
//! item by [`select_candidates`]: unknown ids are discarded, low-confidence
//! candidates are dropped unless that would drop everything, and the survivors
//! are ranked and truncated.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::SelectionConfig;
use crate::oracle::{RootCandidate, RootSelectionQuery, RootSelectionResponse};
use crate::taxonomy::OClass;
use crate::taxonomy::graph::TaxonomyGraph;

use super::{ClassifyRequest, Issue, clamp_confidence};

/// Validated output of root selection, the input of subtree expansion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootSelection {
    /// Concept key → ranked roots. Concepts without roots are absent.
    pub concept_roots: BTreeMap<String, Vec<RootCandidate>>,
    /// Ranked event roots; empty when the event is out of scope or unmatched.
    pub event_roots: Vec<RootCandidate>,
    pub warnings: Vec<Issue>,
}

impl RootSelection {
    /// Whether any item has at least one root.
    pub fn is_empty(&self) -> bool {
        self.concept_roots.is_empty() && self.event_roots.is_empty()
    }

    /// Every root id implicated by any item, deduplicated and sorted.
    pub fn implicated_roots(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .concept_roots
            .values()
            .flatten()
            .chain(self.event_roots.iter())
            .map(|c| c.o_class_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Root partition of one snapshot and the query/selection logic over it.
pub struct RootSelectionStage<'a> {
    config: &'a SelectionConfig,
    all_roots: Vec<&'a OClass>,
    event_roots: Vec<&'a OClass>,
}

impl<'a> RootSelectionStage<'a> {
    /// Partition the graph's roots. Concepts may use any root; the event only
    /// roots of the configured event facet.
    pub fn new(graph: &TaxonomyGraph<'a>, config: &'a SelectionConfig) -> Self {
        let all_roots = graph.roots();
        let event_roots = all_roots
            .iter()
            .copied()
            .filter(|c| c.has_facet(&config.event_facet))
            .collect();
        Self {
            config,
            all_roots,
            event_roots,
        }
    }

    /// Whether the snapshot has any root at all.
    pub fn has_roots(&self) -> bool {
        !self.all_roots.is_empty()
    }

    pub fn root_count(&self) -> usize {
        self.all_roots.len()
    }

    /// Build the bounded root-selection query.
    pub fn query(&self, request: &ClassifyRequest) -> RootSelectionQuery {
        let views = |roots: &[&OClass]| roots.iter().map(|c| c.view()).collect::<Vec<_>>();
        let include_event = request.classifies_event();
        RootSelectionQuery {
            mode: request.mode,
            scope: request.scope,
            root_o_classes: views(&self.all_roots),
            concept_root_o_classes: views(&self.all_roots),
            event_root_o_classes: views(&self.event_roots),
            concepts: request.scoped_concepts().to_vec(),
            event_title: request.event_title.clone().filter(|_| include_event),
            event_normalized_text_en: request
                .event_normalized_text_en
                .clone()
                .filter(|_| include_event),
        }
    }

    /// Apply the per-item selection rule to the oracle's answer.
    pub fn select(&self, request: &ClassifyRequest, response: RootSelectionResponse) -> RootSelection {
        let mut selection = RootSelection {
            warnings: response.errors.into_iter().map(Issue::from_oracle).collect(),
            ..Default::default()
        };

        let concept_allowed: HashSet<&str> = self.all_roots.iter().map(|c| c.id.as_str()).collect();
        let event_allowed: HashSet<&str> = self.event_roots.iter().map(|c| c.id.as_str()).collect();

        let mut raw_by_concept: HashMap<String, Vec<RootCandidate>> = HashMap::new();
        for entry in response.concept_roots {
            raw_by_concept
                .entry(entry.concept_key)
                .or_default()
                .extend(entry.roots);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for concept in request.scoped_concepts() {
            let key = concept.concept_key.as_str();
            if !seen.insert(key) {
                continue;
            }
            let raw = raw_by_concept.remove(key).unwrap_or_default();
            let selected = select_candidates(raw, &concept_allowed, self.config);
            if selected.is_empty() {
                selection.warnings.push(
                    Issue::validation("no roots selected for concept").with("conceptKey", key),
                );
            } else {
                selection.concept_roots.insert(key.to_string(), selected);
            }
        }

        // Whatever is left belongs to keys the request never mentioned.
        if !raw_by_concept.is_empty() {
            let mut unknown: Vec<String> = raw_by_concept.into_keys().collect();
            unknown.sort();
            selection.warnings.push(
                Issue::validation("root candidates for unknown concepts ignored")
                    .with("droppedCount", unknown.len())
                    .with("dropped", unknown),
            );
        }

        if request.classifies_event() {
            selection.event_roots =
                select_candidates(response.event_roots, &event_allowed, self.config);
            if selection.event_roots.is_empty() {
                selection
                    .warnings
                    .push(Issue::validation("no roots selected for event"));
            }
        }

        tracing::debug!(
            concepts = selection.concept_roots.len(),
            event_roots = selection.event_roots.len(),
            warnings = selection.warnings.len(),
            "root selection validated"
        );
        selection
    }
}

/// Filter, rank and truncate raw root candidates for one item.
///
/// 1. keep candidates whose id is allowed (duplicates merge to the highest
///    confidence, confidences clamp to `[0, 1]`)
/// 2. keep those at or above `min_root_confidence`, unless none are
/// 3. rank by confidence, ties by id, and keep at most `max_roots`
pub fn select_candidates(
    raw: Vec<RootCandidate>,
    allowed: &HashSet<&str>,
    config: &SelectionConfig,
) -> Vec<RootCandidate> {
    let mut valid: Vec<RootCandidate> = Vec::new();
    for mut candidate in raw {
        if !allowed.contains(candidate.o_class_id.as_str()) {
            continue;
        }
        candidate.confidence = clamp_confidence(candidate.confidence);
        match valid
            .iter_mut()
            .find(|c| c.o_class_id == candidate.o_class_id)
        {
            Some(existing) if existing.confidence < candidate.confidence => *existing = candidate,
            Some(_) => {}
            None => valid.push(candidate),
        }
    }

    let confident: Vec<RootCandidate> = valid
        .iter()
        .filter(|c| c.confidence >= config.min_root_confidence)
        .cloned()
        .collect();
    let mut ranked = if confident.is_empty() { valid } else { confident };

    ranked.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.o_class_id.cmp(&b.o_class_id))
    });
    ranked.truncate(config.max_roots);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ConceptSample, Scope};
    use crate::oracle::ConceptRoots;
    use crate::taxonomy::{SubclassEdge, TaxonomySnapshot};

    fn allowed<'a>(ids: &[&'a str]) -> HashSet<&'a str> {
        ids.iter().copied().collect()
    }

    fn ids(candidates: &[RootCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.o_class_id.as_str()).collect()
    }

    #[test]
    fn hallucinated_ids_are_discarded() {
        let config = SelectionConfig::default();
        let raw = vec![
            RootCandidate::new("E_Place", 0.9),
            RootCandidate::new("E_Imaginary", 0.99),
        ];
        let selected = select_candidates(raw, &allowed(&["E_Place"]), &config);
        assert_eq!(ids(&selected), vec!["E_Place"]);
    }

    #[test]
    fn low_confidence_falls_back_to_all_valid() {
        let config = SelectionConfig::default();
        let raw = vec![
            RootCandidate::new("A", 0.1),
            RootCandidate::new("B", 0.3),
            RootCandidate::new("Ghost", 0.9),
        ];
        let selected = select_candidates(raw, &allowed(&["A", "B"]), &config);
        assert_eq!(ids(&selected), vec!["B", "A"]);
    }

    #[test]
    fn threshold_drops_weak_candidates_when_strong_exist() {
        let config = SelectionConfig::default();
        let raw = vec![RootCandidate::new("A", 0.1), RootCandidate::new("B", 0.4)];
        let selected = select_candidates(raw, &allowed(&["A", "B"]), &config);
        assert_eq!(ids(&selected), vec!["B"]);
    }

    #[test]
    fn ranking_truncates_to_max_roots() {
        let config = SelectionConfig {
            max_roots: 2,
            ..Default::default()
        };
        let raw = vec![
            RootCandidate::new("C", 0.5),
            RootCandidate::new("A", 0.9),
            RootCandidate::new("B", 0.9),
            RootCandidate::new("D", 0.7),
        ];
        let selected = select_candidates(raw, &allowed(&["A", "B", "C", "D"]), &config);
        assert_eq!(ids(&selected), vec!["A", "B"]);
    }

    #[test]
    fn duplicates_keep_highest_confidence() {
        let config = SelectionConfig::default();
        let raw = vec![
            RootCandidate::new("A", 0.5),
            RootCandidate::new("A", 1.4),
            RootCandidate::new("A", 0.2),
        ];
        let selected = select_candidates(raw, &allowed(&["A"]), &config);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].confidence, 1.0);
    }

    fn stage_fixture() -> TaxonomySnapshot {
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

    fn request() -> ClassifyRequest {
        ClassifyRequest {
            concepts: vec![
                ConceptSample::new("Place::X", "Place", "X"),
                ConceptSample::new("Person::Alice", "Person", "Alice"),
            ],
            snapshot: stage_fixture(),
            event_id: Some("evt-1".into()),
            event_title: Some("Climbing with Alice".into()),
            ..Default::default()
        }
    }

    #[test]
    fn event_only_matches_activity_roots() {
        let req = request();
        let config = SelectionConfig::default();
        let graph = TaxonomyGraph::new(&req.snapshot);
        let stage = RootSelectionStage::new(&graph, &config);

        let query = stage.query(&req);
        assert_eq!(query.root_o_classes.len(), 2);
        assert_eq!(query.event_root_o_classes.len(), 1);
        assert_eq!(query.event_root_o_classes[0].id, "A_Activity");

        let response = RootSelectionResponse {
            event_roots: vec![
                RootCandidate::new("E_Place", 0.99),
                RootCandidate::new("A_Activity", 0.95),
            ],
            ..Default::default()
        };
        let selection = stage.select(&req, response);
        assert_eq!(ids(&selection.event_roots), vec!["A_Activity"]);
    }

    #[test]
    fn missing_concepts_become_warnings() {
        let req = request();
        let config = SelectionConfig::default();
        let graph = TaxonomyGraph::new(&req.snapshot);
        let stage = RootSelectionStage::new(&graph, &config);

        let response = RootSelectionResponse {
            concept_roots: vec![
                ConceptRoots {
                    concept_key: "Place::X".into(),
                    roots: vec![RootCandidate::new("E_Place", 0.9)],
                },
                ConceptRoots {
                    concept_key: "Stranger::Y".into(),
                    roots: vec![RootCandidate::new("E_Place", 0.9)],
                },
            ],
            event_roots: vec![RootCandidate::new("A_Activity", 0.95)],
            errors: vec![serde_json::json!("partial answer")],
        };
        let selection = stage.select(&req, response);

        assert_eq!(selection.concept_roots.len(), 1);
        assert!(selection.concept_roots.contains_key("Place::X"));
        let messages: Vec<&str> = selection.warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.contains(&"partial answer"));
        assert!(messages.contains(&"no roots selected for concept"));
        assert!(messages.contains(&"root candidates for unknown concepts ignored"));
        assert_eq!(selection.implicated_roots(), vec!["A_Activity", "E_Place"]);
    }

    #[test]
    fn concept_scope_ignores_event() {
        let mut req = request();
        req.scope = Scope::Concept;
        let config = SelectionConfig::default();
        let graph = TaxonomyGraph::new(&req.snapshot);
        let stage = RootSelectionStage::new(&graph, &config);

        let query = stage.query(&req);
        assert!(query.event_title.is_none());

        let response = RootSelectionResponse {
            event_roots: vec![RootCandidate::new("A_Activity", 0.95)],
            ..Default::default()
        };
        let selection = stage.select(&req, response);
        assert!(selection.event_roots.is_empty());
        assert!(
            !selection
                .warnings
                .iter()
                .any(|w| w.message == "no roots selected for event")
        );
    }
}
