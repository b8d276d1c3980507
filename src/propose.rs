//! Propose: taxonomy additions and query templates for competency questions.
//!
//! Single oracle call. The draft is held to the same coherence rules as
//! `allow_new_leaf` classification, and classifications must point at a class
//! that exists or was coherently proposed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::classify::validate::{check_additions, dropped_issue};
use crate::classify::{Classification, ConceptSample, Issue, Stage, clamp_confidence};
use crate::config::SelectionConfig;
use crate::error::RequestError;
use crate::oracle::Oracle;
use crate::taxonomy::graph::TaxonomyGraph;
use crate::taxonomy::{OClass, SubclassEdge, TaxonomySnapshot};

/// Inbound propose request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeRequest {
    /// Competency questions the graph should be able to answer.
    pub cqs: Vec<String>,
    #[serde(default)]
    pub snapshot: TaxonomySnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_samples: Option<Vec<ConceptSample>>,
}

impl ProposeRequest {
    /// At least one non-blank question is required.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.cqs.iter().all(|q| q.trim().is_empty()) {
            return Err(RequestError::EmptyQuestions);
        }
        Ok(())
    }
}

/// A read-only query sketch answering one competency question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cq_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_sketch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Vec<Map<String, Value>>>,
}

/// Raw propose answer from the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDraft {
    #[serde(default = "default_true")]
    pub ok: bool,
    #[serde(default)]
    pub o_classes_to_add: Vec<OClass>,
    #[serde(default)]
    pub subclass_edges_to_add: Vec<SubclassEdge>,
    #[serde(default)]
    pub classifications: Vec<Classification>,
    #[serde(default)]
    pub query_templates: Vec<QueryTemplate>,
    #[serde(default)]
    pub errors: Vec<Value>,
    #[serde(default)]
    pub warnings: Vec<Value>,
}

fn default_true() -> bool {
    true
}

impl Default for ProposalDraft {
    fn default() -> Self {
        Self {
            ok: true,
            o_classes_to_add: Vec::new(),
            subclass_edges_to_add: Vec::new(),
            classifications: Vec::new(),
            query_templates: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Validated propose answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeResponse {
    pub ok: bool,
    #[serde(default)]
    pub o_classes_to_add: Vec<OClass>,
    #[serde(default)]
    pub subclass_edges_to_add: Vec<SubclassEdge>,
    #[serde(default)]
    pub classifications: Vec<Classification>,
    #[serde(default)]
    pub query_templates: Vec<QueryTemplate>,
    #[serde(default)]
    pub errors: Vec<Issue>,
    #[serde(default)]
    pub warnings: Vec<Issue>,
}

impl ProposeResponse {
    fn failed(error: Issue) -> Self {
        Self {
            ok: false,
            o_classes_to_add: Vec::new(),
            subclass_edges_to_add: Vec::new(),
            classifications: Vec::new(),
            query_templates: Vec::new(),
            errors: vec![error],
            warnings: Vec::new(),
        }
    }
}

/// Ask the oracle for a proposal and validate it against the snapshot.
pub async fn propose(
    oracle: &dyn Oracle,
    request: &ProposeRequest,
    selection: &SelectionConfig,
) -> ProposeResponse {
    if !oracle.is_enabled() {
        tracing::warn!(oracle = oracle.name(), "propose requested with oracle disabled");
        return ProposeResponse::failed(Issue::new(
            Stage::Disabled,
            "oracle is disabled: no API key configured",
        ));
    }

    tracing::info!(cqs = request.cqs.len(), "propose started");
    let draft = match oracle.propose(request).await {
        Ok(draft) => draft,
        Err(e) => {
            tracing::warn!(error = %e, "propose oracle call failed");
            return ProposeResponse::failed(Issue::new(e.stage(), e.to_string()));
        }
    };

    let response = review(draft, &request.snapshot, selection.dropped_sample_limit);
    tracing::info!(
        ok = response.ok,
        classes = response.o_classes_to_add.len(),
        templates = response.query_templates.len(),
        warnings = response.warnings.len(),
        "propose finished"
    );
    response
}

/// Validate a draft against the snapshot.
pub fn review(draft: ProposalDraft, snapshot: &TaxonomySnapshot, sample_limit: usize) -> ProposeResponse {
    let graph = TaxonomyGraph::new(snapshot);

    let mut errors: Vec<Issue> = draft.errors.into_iter().map(Issue::from_oracle).collect();
    if !draft.ok && errors.is_empty() {
        errors.push(Issue::new(Stage::Oracle, "oracle flagged its answer as not ok"));
    }
    let mut warnings: Vec<Issue> = draft.warnings.into_iter().map(Issue::from_oracle).collect();

    let mut additions = check_additions(
        &graph.class_ids(),
        draft.o_classes_to_add,
        draft.subclass_edges_to_add,
        sample_limit,
    );
    warnings.append(&mut additions.warnings);

    let mut dropped = Vec::new();
    let classifications: Vec<Classification> = draft
        .classifications
        .into_iter()
        .filter_map(|mut c| {
            if graph.contains(&c.o_class_id) || additions.contains_class(&c.o_class_id) {
                c.confidence = clamp_confidence(c.confidence);
                Some(c)
            } else {
                dropped.push(json!({"conceptKey": c.concept_key, "oClassId": c.o_class_id}));
                None
            }
        })
        .collect();
    if !dropped.is_empty() {
        warnings.push(dropped_issue(
            "dropped classifications with unknown class ids",
            dropped,
            sample_limit,
        ));
    }

    ProposeResponse {
        ok: errors.is_empty(),
        o_classes_to_add: additions.classes,
        subclass_edges_to_add: additions.edges,
        classifications,
        query_templates: draft.query_templates,
        errors,
        warnings,
    }
}
