//! Validator/Repair: turn an untrusted leaf answer into a response that obeys
//! mode, scope and candidate-set policies.
//!
//! Nothing here fails the request. Every record that breaks a policy is
//! dropped or rewritten, and the drop is reported as a warning carrying a
//! count and a bounded sample.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::{Value, json};

use crate::oracle::LeafClassificationResponse;
use crate::taxonomy::graph::TaxonomyGraph;
use crate::taxonomy::{OClass, SubclassEdge};

use super::leaves::{CandidatePlan, ItemCandidates};
use super::{
    Classification, ClassifyRequest, ClassifyResponse, EventActivityClassification, Issue, Mode,
    Stage, clamp_confidence,
};

// ---------------------------------------------------------------------------
// Additions coherence
// ---------------------------------------------------------------------------

/// Proposed taxonomy additions that passed the coherence check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Additions {
    pub classes: Vec<OClass>,
    pub edges: Vec<SubclassEdge>,
    pub warnings: Vec<Issue>,
}

impl Additions {
    /// Proposed parents of a kept new class.
    pub fn parents_of<'s>(&'s self, class_id: &'s str) -> impl Iterator<Item = &'s str> + 's {
        self.edges
            .iter()
            .filter(move |e| e.child_id == class_id)
            .map(|e| e.parent_id.as_str())
    }

    pub fn contains_class(&self, id: &str) -> bool {
        self.classes.iter().any(|c| c.id == id)
    }
}

/// Keep only coherent additions.
///
/// A new class must have a non-blank id that is neither an existing class nor
/// proposed twice; surrounding whitespace is trimmed. An edge must attach a
/// kept new class (the child) to a known parent, existing or newly proposed.
/// Repeated edges collapse. A new class that no kept edge attaches would be a
/// new root, so it is dropped along with any edge hanging below it.
pub fn check_additions(
    existing: &HashSet<&str>,
    classes: Vec<OClass>,
    edges: Vec<SubclassEdge>,
    sample_limit: usize,
) -> Additions {
    let mut kept_classes: Vec<OClass> = Vec::new();
    let mut rejected_classes: Vec<Value> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for mut class in classes {
        let id = class.id.trim().to_string();
        if id.is_empty() || existing.contains(id.as_str()) || !seen.insert(id.clone()) {
            rejected_classes.push(Value::String(class.id));
            continue;
        }
        class.id = id;
        kept_classes.push(class);
    }

    let mut kept_edges: Vec<SubclassEdge> = Vec::new();
    let mut rejected_edges: Vec<Value> = Vec::new();
    for edge in edges {
        let parent_known =
            existing.contains(edge.parent_id.as_str()) || seen.contains(edge.parent_id.as_str());
        let child_new = seen.contains(edge.child_id.as_str());
        if !parent_known || !child_new || edge.parent_id == edge.child_id {
            rejected_edges.push(json!({"parentId": edge.parent_id, "childId": edge.child_id}));
            continue;
        }
        if !kept_edges.contains(&edge) {
            kept_edges.push(edge);
        }
    }

    // Unattached classes go first, then edges whose new parent went with them,
    // until nothing changes.
    loop {
        let attached: HashSet<&str> = kept_edges.iter().map(|e| e.child_id.as_str()).collect();
        let (kept, orphans): (Vec<OClass>, Vec<OClass>) = kept_classes
            .into_iter()
            .partition(|c| attached.contains(c.id.as_str()));
        kept_classes = kept;
        if orphans.is_empty() {
            break;
        }
        for orphan in orphans {
            seen.remove(&orphan.id);
            rejected_classes.push(Value::String(orphan.id));
        }
        kept_edges.retain(|edge| {
            let keep = existing.contains(edge.parent_id.as_str()) || seen.contains(&edge.parent_id);
            if !keep {
                rejected_edges.push(json!({"parentId": edge.parent_id, "childId": edge.child_id}));
            }
            keep
        });
    }

    let mut warnings = Vec::new();
    if !rejected_classes.is_empty() {
        warnings.push(dropped_issue(
            "proposed classes rejected: id missing, duplicated, already present or not attached",
            rejected_classes,
            sample_limit,
        ));
    }
    if !rejected_edges.is_empty() {
        warnings.push(dropped_issue(
            "proposed edges rejected: unknown parent or child is not a proposed class",
            rejected_edges,
            sample_limit,
        ));
    }

    Additions {
        classes: kept_classes,
        edges: kept_edges,
        warnings,
    }
}

/// A `validation` warning with `droppedCount` and the first `limit` items.
pub(crate) fn dropped_issue(message: &str, dropped: Vec<Value>, limit: usize) -> Issue {
    let count = dropped.len();
    let sample: Vec<Value> = dropped.into_iter().take(limit).collect();
    Issue::validation(message)
        .with("droppedCount", count)
        .with("dropped", sample)
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Applies the repair policies to one leaf answer.
pub struct Validator<'r> {
    request: &'r ClassifyRequest,
    graph: &'r TaxonomyGraph<'r>,
    plan: &'r CandidatePlan,
    sample_limit: usize,
}

impl<'r> Validator<'r> {
    pub fn new(
        request: &'r ClassifyRequest,
        graph: &'r TaxonomyGraph<'r>,
        plan: &'r CandidatePlan,
        sample_limit: usize,
    ) -> Self {
        Self {
            request,
            graph,
            plan,
            sample_limit,
        }
    }

    /// Repair `raw` into the final response. `warnings` are the issues
    /// accumulated by earlier stages; they lead the response's warning list.
    pub fn repair(&self, raw: LeafClassificationResponse, mut warnings: Vec<Issue>) -> ClassifyResponse {
        if !raw.ok {
            warnings.push(Issue::new(Stage::Oracle, "oracle flagged its answer as not ok"));
        }
        warnings.extend(raw.errors.into_iter().map(Issue::from_oracle));
        warnings.extend(raw.warnings.into_iter().map(Issue::from_oracle));

        let additions = self.additions(raw.o_classes_to_add, raw.subclass_edges_to_add, &mut warnings);

        let mut classifications: Vec<Classification> = raw
            .classifications
            .into_iter()
            .map(|mut c| {
                c.confidence = clamp_confidence(c.confidence);
                c
            })
            .collect();
        let mut activities: Vec<EventActivityClassification> = raw
            .event_activities
            .into_iter()
            .map(|mut a| {
                a.confidence = clamp_confidence(a.confidence);
                a
            })
            .collect();

        self.enforce_scope(&mut classifications, &mut activities, &mut warnings);
        self.enforce_existence(&mut classifications, &mut activities, &additions, &mut warnings);
        self.enforce_candidates(&mut classifications, &mut activities, &additions, &mut warnings);
        self.dedupe(&mut classifications, &mut activities, &mut warnings);
        self.backfill_event_ids(&mut activities, &mut warnings);
        self.backfill_concept_fields(&mut classifications);

        if !self.plan.is_empty() && classifications.is_empty() && activities.is_empty() {
            warnings.push(Issue::new(
                Stage::Classification,
                "no usable classification in oracle response",
            ));
        }

        ClassifyResponse {
            ok: true,
            classifications,
            event_activities: activities,
            o_classes_to_add: additions.classes,
            subclass_edges_to_add: additions.edges,
            errors: Vec::new(),
            warnings,
        }
    }

    fn additions(
        &self,
        classes: Vec<OClass>,
        edges: Vec<SubclassEdge>,
        warnings: &mut Vec<Issue>,
    ) -> Additions {
        match self.request.mode {
            Mode::ExistingOnly => {
                if !classes.is_empty() || !edges.is_empty() {
                    warnings.push(
                        Issue::validation("proposed additions stripped in existing_only mode")
                            .with("classCount", classes.len())
                            .with("edgeCount", edges.len()),
                    );
                }
                Additions::default()
            }
            Mode::AllowNewLeaf => {
                let mut additions =
                    check_additions(&self.graph.class_ids(), classes, edges, self.sample_limit);
                warnings.append(&mut additions.warnings);
                additions
            }
        }
    }

    fn enforce_scope(
        &self,
        classifications: &mut Vec<Classification>,
        activities: &mut Vec<EventActivityClassification>,
        warnings: &mut Vec<Issue>,
    ) {
        let scope = self.request.scope;
        if !scope.includes_concepts() && !classifications.is_empty() {
            warnings.push(
                Issue::validation("classifications dropped: scope excludes concepts")
                    .with("droppedCount", classifications.len()),
            );
            classifications.clear();
        }
        if !scope.includes_event() && !activities.is_empty() {
            warnings.push(
                Issue::validation("event activities dropped: scope excludes the event")
                    .with("droppedCount", activities.len()),
            );
            activities.clear();
        }
    }

    fn enforce_existence(
        &self,
        classifications: &mut Vec<Classification>,
        activities: &mut Vec<EventActivityClassification>,
        additions: &Additions,
        warnings: &mut Vec<Issue>,
    ) {
        let known = |id: &str| self.graph.contains(id) || additions.contains_class(id);

        let mut dropped = Vec::new();
        classifications.retain(|c| {
            let keep = known(&c.o_class_id);
            if !keep {
                dropped.push(json!({"conceptKey": c.concept_key, "oClassId": c.o_class_id}));
            }
            keep
        });
        activities.retain(|a| {
            let keep = known(&a.o_class_id);
            if !keep {
                dropped.push(json!({"event": true, "oClassId": a.o_class_id}));
            }
            keep
        });
        if !dropped.is_empty() {
            warnings.push(dropped_issue(
                "dropped classifications with class ids not in the snapshot",
                dropped,
                self.sample_limit,
            ));
        }
    }

    fn enforce_candidates(
        &self,
        classifications: &mut Vec<Classification>,
        activities: &mut Vec<EventActivityClassification>,
        additions: &Additions,
        warnings: &mut Vec<Issue>,
    ) {
        let subtrees = self.new_leaf_subtrees(additions);
        let allowed = |item: Option<&ItemCandidates>, id: &str| -> bool {
            let Some(item) = item else {
                return false;
            };
            if item.leaves.contains(id) {
                return true;
            }
            // A kept new leaf counts when attached inside one of the item's roots.
            additions.contains_class(id)
                && additions.parents_of(id).any(|parent| {
                    item.roots
                        .iter()
                        .filter_map(|root| subtrees.get(root.as_str()))
                        .any(|members| members.contains(parent))
                })
        };

        let mut dropped = Vec::new();
        classifications.retain(|c| {
            let keep = allowed(self.plan.concept(&c.concept_key), &c.o_class_id);
            if !keep {
                dropped.push(json!({"conceptKey": c.concept_key, "oClassId": c.o_class_id}));
            }
            keep
        });
        if !dropped.is_empty() {
            warnings.push(dropped_issue(
                "dropped classifications outside the concept's candidate leaves",
                dropped,
                self.sample_limit,
            ));
        }

        let mut dropped = Vec::new();
        activities.retain(|a| {
            let keep = allowed(self.plan.event.as_ref(), &a.o_class_id);
            if !keep {
                dropped.push(Value::String(a.o_class_id.clone()));
            }
            keep
        });
        if !dropped.is_empty() {
            warnings.push(dropped_issue(
                "dropped event activities outside the event's candidate leaves",
                dropped,
                self.sample_limit,
            ));
        }
    }

    /// Root id → every id in its subtree, for roots whose subtree may host a
    /// kept new leaf. Empty unless new classes survived.
    fn new_leaf_subtrees(&self, additions: &Additions) -> HashMap<String, BTreeSet<String>> {
        if additions.classes.is_empty() {
            return HashMap::new();
        }
        self.plan
            .concepts
            .values()
            .chain(self.plan.event.iter())
            .flat_map(|item| item.roots.iter())
            .map(|root| (root.clone(), self.graph.descendants_of(root)))
            .collect()
    }

    fn dedupe(
        &self,
        classifications: &mut Vec<Classification>,
        activities: &mut Vec<EventActivityClassification>,
        warnings: &mut Vec<Issue>,
    ) {
        let before = classifications.len();
        let mut best: Vec<Classification> = Vec::with_capacity(before);
        for c in classifications.drain(..) {
            match best
                .iter_mut()
                .find(|b| b.concept_key == c.concept_key && b.o_class_id == c.o_class_id)
            {
                Some(existing) if existing.confidence < c.confidence => *existing = c,
                Some(_) => {}
                None => best.push(c),
            }
        }
        *classifications = best;
        if classifications.len() < before {
            warnings.push(
                Issue::validation("duplicate classifications merged")
                    .with("droppedCount", before - classifications.len()),
            );
        }

        let before = activities.len();
        let mut best: Vec<EventActivityClassification> = Vec::with_capacity(before);
        for a in activities.drain(..) {
            match best.iter_mut().find(|b| b.o_class_id == a.o_class_id) {
                Some(existing) if existing.confidence < a.confidence => *existing = a,
                Some(_) => {}
                None => best.push(a),
            }
        }
        *activities = best;
        if activities.len() < before {
            warnings.push(
                Issue::validation("duplicate event activities merged")
                    .with("droppedCount", before - activities.len()),
            );
        }
    }

    fn backfill_event_ids(
        &self,
        activities: &mut Vec<EventActivityClassification>,
        warnings: &mut Vec<Issue>,
    ) {
        if activities.is_empty() {
            return;
        }
        let Some(canonical) = self.request.canonical_event_id() else {
            warnings.push(
                Issue::validation("event activities dropped: no event id available")
                    .with("droppedCount", activities.len()),
            );
            activities.clear();
            return;
        };

        let mut rewritten = 0usize;
        for activity in activities.iter_mut() {
            match activity.event_id.as_deref() {
                Some(id) if id == canonical => {}
                Some(_) => {
                    rewritten += 1;
                    activity.event_id = Some(canonical.to_string());
                }
                None => activity.event_id = Some(canonical.to_string()),
            }
        }
        if rewritten > 0 {
            warnings.push(
                Issue::validation("event ids rewritten to the request's event id")
                    .with("rewrittenCount", rewritten)
                    .with("eventId", canonical),
            );
        }
    }

    /// Fill blank concept type/name from the request sample.
    fn backfill_concept_fields(&self, classifications: &mut [Classification]) {
        for c in classifications.iter_mut() {
            let Some(sample) = self
                .request
                .concepts
                .iter()
                .find(|s| s.concept_key == c.concept_key)
            else {
                continue;
            };
            if c.concept_type.trim().is_empty() {
                c.concept_type = sample.concept_type.clone();
            }
            if c.concept_name.trim().is_empty() {
                c.concept_name = sample.concept_name.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::roots::RootSelection;
    use crate::classify::{ConceptSample, Scope};
    use crate::oracle::RootCandidate;
    use crate::taxonomy::TaxonomySnapshot;

    fn snapshot() -> TaxonomySnapshot {
        TaxonomySnapshot::new(
            vec![
                OClass::new("E_Place").with_facet("Entity").root(),
                OClass::new("E_Restaurant").with_facet("Entity"),
                OClass::new("A_Activity").with_facet("Activity").root(),
                OClass::new("A_Climbing").with_facet("Activity"),
                OClass::new("A_Sport").with_facet("Activity"),
                OClass::new("A_Bouldering").with_facet("Activity"),
            ],
            vec![
                SubclassEdge::new("E_Place", "E_Restaurant"),
                SubclassEdge::new("A_Activity", "A_Climbing"),
                SubclassEdge::new("A_Activity", "A_Sport"),
                SubclassEdge::new("A_Sport", "A_Bouldering"),
            ],
        )
    }

    fn request(mode: Mode, scope: Scope) -> ClassifyRequest {
        ClassifyRequest {
            concepts: vec![ConceptSample::new("Place::X", "Place", "X")],
            snapshot: snapshot(),
            mode,
            scope,
            event_id: Some("evt-1".into()),
            event_title: Some("Climbing with Alice".into()),
            ..Default::default()
        }
    }

    fn plan(graph: &TaxonomyGraph<'_>) -> CandidatePlan {
        let mut selection = RootSelection::default();
        selection
            .concept_roots
            .insert("Place::X".into(), vec![RootCandidate::new("E_Place", 0.9)]);
        selection.event_roots = vec![RootCandidate::new("A_Activity", 0.95)];
        CandidatePlan::build(graph, &selection, 200)
    }

    fn classification(key: &str, id: &str, confidence: f32) -> Classification {
        Classification {
            concept_key: key.into(),
            concept_type: String::new(),
            concept_name: String::new(),
            o_class_id: id.into(),
            confidence,
            rationale: None,
        }
    }

    fn activity(event_id: Option<&str>, id: &str, confidence: f32) -> EventActivityClassification {
        EventActivityClassification {
            event_id: event_id.map(str::to_string),
            o_class_id: id.into(),
            confidence,
            rationale: None,
        }
    }

    fn has_warning(response: &ClassifyResponse, message: &str) -> bool {
        response.warnings.iter().any(|w| w.message == message)
    }

    #[test]
    fn leaf_only_invariant_drops_roots() {
        let req = request(Mode::ExistingOnly, Scope::Both);
        let graph = TaxonomyGraph::new(&req.snapshot);
        let plan = plan(&graph);
        let raw = LeafClassificationResponse {
            classifications: vec![classification("Place::X", "E_Place", 0.9)],
            event_activities: vec![
                activity(Some("E1"), "A_Climbing", 0.9),
                activity(Some("E1"), "A_Activity", 0.7),
            ],
            ..Default::default()
        };

        let response = Validator::new(&req, &graph, &plan, 50).repair(raw, Vec::new());
        assert!(response.ok);
        assert!(response.classifications.is_empty());
        assert_eq!(response.event_activities.len(), 1);
        assert_eq!(response.event_activities[0].o_class_id, "A_Climbing");
        assert_eq!(response.event_activities[0].event_id.as_deref(), Some("evt-1"));
        assert!(has_warning(
            &response,
            "dropped classifications outside the concept's candidate leaves"
        ));
        assert!(has_warning(&response, "event ids rewritten to the request's event id"));
    }

    #[test]
    fn existing_only_strips_additions_and_unknown_ids() {
        let req = request(Mode::ExistingOnly, Scope::Concept);
        let graph = TaxonomyGraph::new(&req.snapshot);
        let plan = plan(&graph);
        let raw = LeafClassificationResponse {
            classifications: vec![
                classification("Place::X", "E_Restaurant", 0.8),
                classification("Place::X", "E_Cafe", 0.9),
            ],
            o_classes_to_add: vec![OClass::new("E_Cafe")],
            subclass_edges_to_add: vec![SubclassEdge::new("E_Place", "E_Cafe")],
            ..Default::default()
        };

        let response = Validator::new(&req, &graph, &plan, 50).repair(raw, Vec::new());
        assert!(response.o_classes_to_add.is_empty());
        assert!(response.subclass_edges_to_add.is_empty());
        assert_eq!(response.classifications.len(), 1);
        assert_eq!(response.classifications[0].o_class_id, "E_Restaurant");
        assert_eq!(response.classifications[0].concept_type, "Place");
        let unknown = response
            .warnings
            .iter()
            .find(|w| w.message == "dropped classifications with class ids not in the snapshot")
            .unwrap();
        assert_eq!(unknown.details["droppedCount"], 1);
        assert_eq!(unknown.details["dropped"][0]["oClassId"], "E_Cafe");
    }

    #[test]
    fn allow_new_leaf_accepts_coherent_leaf_inside_subtree() {
        let req = request(Mode::AllowNewLeaf, Scope::Concept);
        let graph = TaxonomyGraph::new(&req.snapshot);
        let plan = plan(&graph);
        let raw = LeafClassificationResponse {
            classifications: vec![
                classification("Place::X", "E_Cafe", 0.9),
                classification("Place::X", "A_Yoga", 0.9),
            ],
            o_classes_to_add: vec![OClass::new("E_Cafe"), OClass::new("A_Yoga")],
            subclass_edges_to_add: vec![
                SubclassEdge::new("E_Place", "E_Cafe"),
                SubclassEdge::new("A_Sport", "A_Yoga"),
            ],
            ..Default::default()
        };

        let response = Validator::new(&req, &graph, &plan, 50).repair(raw, Vec::new());
        assert_eq!(response.o_classes_to_add.len(), 2);
        assert_eq!(response.subclass_edges_to_add.len(), 2);
        // A_Yoga hangs under the Activity root, which Place::X never selected.
        assert_eq!(response.classifications.len(), 1);
        assert_eq!(response.classifications[0].o_class_id, "E_Cafe");
    }

    #[test]
    fn coherence_rejects_reused_ids_and_orphan_edges() {
        let existing: HashSet<&str> = ["E_Place", "E_Restaurant"].into_iter().collect();
        let additions = check_additions(
            &existing,
            vec![
                OClass::new("E_Restaurant"),
                OClass::new("E_Cafe"),
                OClass::new("E_Cafe"),
                OClass::new(" "),
            ],
            vec![
                SubclassEdge::new("E_Place", "E_Cafe"),
                SubclassEdge::new("E_Place", "E_Cafe"),
                SubclassEdge::new("E_Nowhere", "E_Cafe"),
                SubclassEdge::new("E_Place", "E_Restaurant"),
            ],
            50,
        );
        assert_eq!(additions.classes.len(), 1);
        assert_eq!(additions.edges, vec![SubclassEdge::new("E_Place", "E_Cafe")]);
        assert_eq!(additions.warnings.len(), 2);
        assert_eq!(additions.warnings[0].details["droppedCount"], 3);
        assert_eq!(additions.warnings[1].details["droppedCount"], 2);
    }

    #[test]
    fn unattached_new_classes_are_not_kept_as_roots() {
        let existing: HashSet<&str> = ["E_Place", "E_Restaurant"].into_iter().collect();
        let additions = check_additions(
            &existing,
            vec![OClass::new("Z_NewRoot"), OClass::new("Z_Inner")],
            vec![SubclassEdge::new("Z_Inner", "Z_Other")],
            50,
        );
        assert!(additions.classes.is_empty());
        assert!(additions.edges.is_empty());
        assert_eq!(additions.warnings.len(), 2);
        assert_eq!(additions.warnings[0].details["droppedCount"], 2);
        assert_eq!(additions.warnings[1].details["droppedCount"], 1);
    }

    #[test]
    fn chain_below_an_unattached_class_is_dropped() {
        let existing: HashSet<&str> = ["E_Place"].into_iter().collect();
        let additions = check_additions(
            &existing,
            vec![
                OClass::new("E_Venue"),
                OClass::new("E_Bar"),
                OClass::new("E_Cafe"),
            ],
            vec![
                SubclassEdge::new("E_Venue", "E_Bar"),
                SubclassEdge::new("E_Place", "E_Cafe"),
            ],
            50,
        );
        let ids: Vec<&str> = additions.classes.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["E_Cafe"]);
        assert_eq!(additions.edges, vec![SubclassEdge::new("E_Place", "E_Cafe")]);
        assert_eq!(additions.warnings[0].details["droppedCount"], 2);
        assert_eq!(additions.warnings[1].details["droppedCount"], 1);
    }

    #[test]
    fn padded_class_ids_are_stored_trimmed() {
        let existing: HashSet<&str> = ["E_Place"].into_iter().collect();
        let additions = check_additions(
            &existing,
            vec![OClass::new(" E_Cafe ")],
            vec![SubclassEdge::new("E_Place", "E_Cafe")],
            50,
        );
        assert_eq!(additions.classes.len(), 1);
        assert_eq!(additions.classes[0].id, "E_Cafe");
        assert!(additions.contains_class("E_Cafe"));
        assert_eq!(additions.parents_of("E_Cafe").collect::<Vec<_>>(), vec!["E_Place"]);
        assert!(additions.warnings.is_empty());
    }

    #[test]
    fn scope_empties_excluded_lists() {
        let req = request(Mode::ExistingOnly, Scope::Event);
        let graph = TaxonomyGraph::new(&req.snapshot);
        let plan = plan(&graph);
        let raw = LeafClassificationResponse {
            classifications: vec![classification("Place::X", "E_Restaurant", 0.8)],
            event_activities: vec![activity(None, "A_Climbing", 0.9)],
            ..Default::default()
        };

        let response = Validator::new(&req, &graph, &plan, 50).repair(raw, Vec::new());
        assert!(response.classifications.is_empty());
        assert_eq!(response.event_activities.len(), 1);
        assert_eq!(response.event_activities[0].event_id.as_deref(), Some("evt-1"));
        assert!(!has_warning(&response, "event ids rewritten to the request's event id"));
    }

    #[test]
    fn duplicates_keep_highest_confidence() {
        let req = request(Mode::ExistingOnly, Scope::Both);
        let graph = TaxonomyGraph::new(&req.snapshot);
        let plan = plan(&graph);
        let raw = LeafClassificationResponse {
            classifications: vec![
                classification("Place::X", "E_Restaurant", 0.5),
                classification("Place::X", "E_Restaurant", 0.8),
            ],
            event_activities: vec![
                activity(Some("evt-1"), "A_Bouldering", 0.6),
                activity(Some("evt-1"), "A_Bouldering", 2.0),
            ],
            ..Default::default()
        };

        let response = Validator::new(&req, &graph, &plan, 50).repair(raw, Vec::new());
        assert_eq!(response.classifications.len(), 1);
        assert_eq!(response.classifications[0].confidence, 0.8);
        assert_eq!(response.event_activities.len(), 1);
        assert_eq!(response.event_activities[0].confidence, 1.0);
        assert!(has_warning(&response, "duplicate classifications merged"));
        assert!(has_warning(&response, "duplicate event activities merged"));
    }

    #[test]
    fn no_canonical_id_drops_activities() {
        let mut req = request(Mode::ExistingOnly, Scope::Event);
        req.event_id = None;
        req.event_title = None;
        req.event_normalized_text_en = Some("climbing".into());
        let graph = TaxonomyGraph::new(&req.snapshot);
        let plan = plan(&graph);
        let raw = LeafClassificationResponse {
            event_activities: vec![activity(None, "A_Climbing", 0.9)],
            ..Default::default()
        };

        let response = Validator::new(&req, &graph, &plan, 50).repair(raw, Vec::new());
        assert!(response.event_activities.is_empty());
        assert!(has_warning(&response, "event activities dropped: no event id available"));
        assert!(
            response
                .warnings
                .iter()
                .any(|w| w.stage == Stage::Classification)
        );
    }

    #[test]
    fn oracle_issues_become_warnings() {
        let req = request(Mode::ExistingOnly, Scope::Concept);
        let graph = TaxonomyGraph::new(&req.snapshot);
        let plan = plan(&graph);
        let raw = LeafClassificationResponse {
            ok: false,
            classifications: vec![classification("Place::X", "E_Restaurant", 0.8)],
            errors: vec![json!("could not decide")],
            warnings: vec![json!({"message": "low confidence", "conceptKey": "Place::X"})],
            ..Default::default()
        };

        let earlier = vec![Issue::validation("no roots selected for event")];
        let response = Validator::new(&req, &graph, &plan, 50).repair(raw, earlier);
        assert!(response.ok);
        assert!(response.errors.is_empty());
        assert_eq!(response.warnings[0].message, "no roots selected for event");
        let oracle: Vec<&str> = response
            .warnings
            .iter()
            .filter(|w| w.stage == Stage::Oracle)
            .map(|w| w.message.as_str())
            .collect();
        assert_eq!(
            oracle,
            vec!["oracle flagged its answer as not ok", "could not decide", "low confidence"]
        );
    }
}
