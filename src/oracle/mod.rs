//! Candidate oracle gateway: the external reasoning capability.
//!
//! The oracle is consulted for:
//! - **Root selection**: plausible top-level classes per concept and for the event
//! - **Leaf classification**: a leaf label per item, chosen from bounded candidates
//! - **Propose**: taxonomy additions for competency questions
//!
//! It is untrusted. Every answer goes through the validation in
//! [`crate::classify`] before anything reaches a caller. Outcomes are three-way:
//! `Err` for transport or parse failure, `Ok` with content, and `Ok` with empty
//! lists, which is a legitimate "nothing fits" answer.

pub mod openrouter;
pub mod prompts;
pub mod scripted;

use std::collections::BTreeMap;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::classify::{
    Classification, ConceptSample, EventActivityClassification, Mode, Scope, Stage,
};
use crate::propose::{ProposalDraft, ProposeRequest};
use crate::taxonomy::{ClassView, OClass, SubclassEdge};

/// Errors from the oracle subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum OracleError {
    #[error("oracle is disabled: no API key configured")]
    #[diagnostic(
        code(ontoclass::oracle::disabled),
        help("Set OPENROUTER_API_KEY or oracle.api_key in the config file, or use --replay.")
    )]
    Disabled,

    #[error("oracle request failed: {message}")]
    #[diagnostic(
        code(ontoclass::oracle::transport),
        help("Check network connectivity and oracle.base_url.")
    )]
    Transport { message: String },

    #[error("oracle returned HTTP {status}: {body}")]
    #[diagnostic(
        code(ontoclass::oracle::status),
        help("Check that the API key is valid and the model id exists for this provider.")
    )]
    Status { status: u16, body: String },

    #[error("oracle request timed out after {timeout_secs}s")]
    #[diagnostic(
        code(ontoclass::oracle::timeout),
        help("Increase oracle.timeout_secs or use a faster model.")
    )]
    Timeout { timeout_secs: u64 },

    #[error("failed to parse oracle response: {message}")]
    #[diagnostic(
        code(ontoclass::oracle::parse),
        help("The model returned an unexpected response format.")
    )]
    Parse { message: String },
}

impl OracleError {
    /// Stage tag reported to the caller.
    pub fn stage(&self) -> Stage {
        match self {
            OracleError::Disabled => Stage::Disabled,
            _ => Stage::LlmCall,
        }
    }
}

pub type OracleResult<T> = std::result::Result<T, OracleError>;

// ── Root selection wire types ───────────────────────────────────────────

/// Root-selection query: roots only, never the full tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootSelectionQuery {
    pub mode: Mode,
    pub scope: Scope,
    pub root_o_classes: Vec<ClassView>,
    pub concept_root_o_classes: Vec<ClassView>,
    pub event_root_o_classes: Vec<ClassView>,
    pub concepts: Vec<ConceptSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_normalized_text_en: Option<String>,
}

/// A root class proposed for an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCandidate {
    pub o_class_id: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl RootCandidate {
    pub fn new(o_class_id: impl Into<String>, confidence: f32) -> Self {
        Self {
            o_class_id: o_class_id.into(),
            confidence,
            rationale: None,
        }
    }
}

/// Root candidates for one concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptRoots {
    pub concept_key: String,
    #[serde(default)]
    pub roots: Vec<RootCandidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootSelectionResponse {
    #[serde(default)]
    pub concept_roots: Vec<ConceptRoots>,
    #[serde(default)]
    pub event_roots: Vec<RootCandidate>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

// ── Leaf classification wire types ──────────────────────────────────────

/// A concept with the leaf ids it may be assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptCandidates {
    #[serde(flatten)]
    pub sample: ConceptSample,
    pub root_candidates: Vec<String>,
}

/// The event with the leaf ids it may be assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCandidates {
    pub title: Option<String>,
    pub normalized_text_en: Option<String>,
    pub root_candidates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafClassificationQuery {
    pub mode: Mode,
    pub scope: Scope,
    pub concepts: Vec<ConceptCandidates>,
    pub event: Option<EventCandidates>,
    /// Root id → leaf views reachable from it.
    pub root_subtrees: BTreeMap<String, Vec<ClassView>>,
}

/// Raw leaf answer, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafClassificationResponse {
    #[serde(default = "default_true")]
    pub ok: bool,
    #[serde(default)]
    pub classifications: Vec<Classification>,
    #[serde(default)]
    pub event_activities: Vec<EventActivityClassification>,
    #[serde(default)]
    pub o_classes_to_add: Vec<OClass>,
    #[serde(default)]
    pub subclass_edges_to_add: Vec<SubclassEdge>,
    #[serde(default)]
    pub errors: Vec<Value>,
    #[serde(default)]
    pub warnings: Vec<Value>,
}

fn default_true() -> bool {
    true
}

impl Default for LeafClassificationResponse {
    fn default() -> Self {
        Self {
            ok: true,
            classifications: Vec::new(),
            event_activities: Vec::new(),
            o_classes_to_add: Vec::new(),
            subclass_edges_to_add: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

// ── Gateway trait ───────────────────────────────────────────────────────

/// The external reasoning capability.
///
/// Each method is a single round trip with no retries. Implementations must
/// be cancellation-safe: dropping the returned future abandons the call.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Whether the oracle can be called at all (credentials configured).
    fn is_enabled(&self) -> bool;

    async fn select_roots(&self, query: &RootSelectionQuery) -> OracleResult<RootSelectionResponse>;

    async fn classify_leaves(
        &self,
        query: &LeafClassificationQuery,
    ) -> OracleResult<LeafClassificationResponse>;

    async fn propose(&self, request: &ProposeRequest) -> OracleResult<ProposalDraft>;
}
