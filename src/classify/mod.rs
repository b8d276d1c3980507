//! Constrained hierarchical classification.
//!
//! A request carries concept mentions (and optionally an event title) plus a
//! taxonomy snapshot. Classification runs as a two-call protocol against an
//! external [`Oracle`](crate::oracle::Oracle):
//!
//! 1. [`roots`]: narrow each item to a few plausible root classes
//! 2. [`leaves`]: expand those roots to candidate leaves and ask for a leaf label
//! 3. [`validate`]: enforce mode, scope and candidate-set policies on the answer
//!
//! [`pipeline::ClassificationPipeline`] sequences the stages. Problems found along
//! the way are returned as [`Issue`] records: `errors` fail the request,
//! `warnings` annotate what was filtered or repaired.

pub mod leaves;
pub mod pipeline;
pub mod roots;
pub mod validate;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RequestError;
use crate::taxonomy::{OClass, SubclassEdge, TaxonomySnapshot};

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Whether the oracle may extend the taxonomy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// No new classes or edges; every label must already exist.
    #[default]
    ExistingOnly,
    /// The oracle may propose new leaf classes and the edges attaching them.
    AllowNewLeaf,
}

/// Which items a request wants classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Concept,
    Event,
    #[default]
    Both,
}

impl Scope {
    pub fn includes_concepts(self) -> bool {
        matches!(self, Scope::Concept | Scope::Both)
    }

    pub fn includes_event(self) -> bool {
        matches!(self, Scope::Event | Scope::Both)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Concept => write!(f, "concept"),
            Scope::Event => write!(f, "event"),
            Scope::Both => write!(f, "both"),
        }
    }
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Where an issue was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The oracle has no credentials configured.
    Disabled,
    /// Transport or parse failure talking to the oracle.
    LlmCall,
    /// Internal consistency checks and repairs.
    Validation,
    /// The oracle produced nothing usable for non-empty candidates.
    Classification,
    /// Something the oracle itself reported inside a successful response.
    Oracle,
}

/// A structured error or warning: stage tag, message, and flattened details
/// such as `droppedCount` or `dropped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub stage: Stage,
    pub message: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Issue {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(Stage::Validation, message)
    }

    /// Attach a detail field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Wrap an issue the oracle reported about its own answer.
    ///
    /// Oracles answer with either strings or objects; objects keep their fields
    /// as details and their `message` if present.
    pub fn from_oracle(raw: Value) -> Self {
        match raw {
            Value::String(message) => Self::new(Stage::Oracle, message),
            Value::Object(mut fields) => {
                let message = match fields.remove("message") {
                    Some(Value::String(m)) => m,
                    Some(other) => other.to_string(),
                    None => "oracle reported an issue".to_string(),
                };
                fields.remove("stage");
                Self {
                    stage: Stage::Oracle,
                    message,
                    details: fields,
                }
            }
            other => Self::new(Stage::Oracle, other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Character offsets of a mention inside its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

/// One concept mention to classify.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSample {
    /// Stable identity across calls, e.g. `Place::Gyodong`.
    pub concept_key: String,
    pub concept_type: String,
    pub concept_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_text_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<String>>,
}

impl ConceptSample {
    pub fn new(
        concept_key: impl Into<String>,
        concept_type: impl Into<String>,
        concept_name: impl Into<String>,
    ) -> Self {
        Self {
            concept_key: concept_key.into(),
            concept_type: concept_type.into(),
            concept_name: concept_name.into(),
            ..Default::default()
        }
    }

    pub fn with_source_text(mut self, text: impl Into<String>) -> Self {
        self.source_text = Some(text.into());
        self
    }
}

/// Inbound classify request. Read-only once constructed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRequest {
    #[serde(default)]
    pub concepts: Vec<ConceptSample>,
    pub snapshot: TaxonomySnapshot,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_normalized_text_en: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl ClassifyRequest {
    /// Boundary validation, run before a request reaches the pipeline.
    pub fn validate(&self) -> Result<(), RequestError> {
        let scope = self.scope.to_string();
        if self.scope.includes_concepts() && self.concepts.is_empty() {
            return Err(RequestError::MissingConcepts { scope });
        }
        if self.scope.includes_event() {
            if non_blank(&self.event_id).is_none() {
                return Err(RequestError::MissingEventId { scope });
            }
            if !self.has_event_text() {
                return Err(RequestError::MissingEventText { scope });
            }
        }
        Ok(())
    }

    /// Whether a title or normalized text is available for the event.
    pub fn has_event_text(&self) -> bool {
        non_blank(&self.event_title).is_some() || non_blank(&self.event_normalized_text_en).is_some()
    }

    /// Whether the event takes part in this request.
    pub fn classifies_event(&self) -> bool {
        self.scope.includes_event() && self.has_event_text()
    }

    /// Concepts taking part in this request.
    pub fn scoped_concepts(&self) -> &[ConceptSample] {
        if self.scope.includes_concepts() {
            &self.concepts
        } else {
            &[]
        }
    }

    /// The id event activities are attributed to: the event id, else the
    /// title, else the first concept's source text.
    pub fn canonical_event_id(&self) -> Option<&str> {
        non_blank(&self.event_id)
            .or_else(|| non_blank(&self.event_title))
            .or_else(|| self.concepts.first().and_then(|c| non_blank(&c.source_text)))
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A concept assigned to a leaf class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub concept_key: String,
    #[serde(default)]
    pub concept_type: String,
    #[serde(default)]
    pub concept_name: String,
    pub o_class_id: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// The event title assigned to an activity leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventActivityClassification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub o_class_id: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Final classify answer: the most useful partial result plus what was removed
/// and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyResponse {
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
    pub errors: Vec<Issue>,
    #[serde(default)]
    pub warnings: Vec<Issue>,
}

impl Default for ClassifyResponse {
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

impl ClassifyResponse {
    /// A failed response carrying a single error and no output.
    pub fn failed(error: Issue, warnings: Vec<Issue>) -> Self {
        Self {
            ok: false,
            errors: vec![error],
            warnings,
            ..Default::default()
        }
    }

    /// A successful response with no output, only warnings.
    pub fn empty(warnings: Vec<Issue>) -> Self {
        Self {
            warnings,
            ..Default::default()
        }
    }
}

/// Clamp an oracle-supplied confidence into `[0, 1]`; NaN becomes 0.
pub(crate) fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
