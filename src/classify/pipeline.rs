//! Two-call classification pipeline.
//!
//! ```text
//! Init ─► RootsRequested ─► RootsValidated ─► LeavesRequested ─► LeavesValidated ─► Done
//!  │            │                 │                  │
//!  └─► Failed ◄─┘                 └─► Done           └─► Failed
//! ```
//!
//! Failures before or during an oracle call end the request with a single
//! error and no output. Once the leaf answer has parsed, nothing escalates:
//! the validator repairs and warns.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::oracle::{Oracle, OracleError};
use crate::propose::{ProposeRequest, ProposeResponse};
use crate::taxonomy::graph::TaxonomyGraph;

use super::leaves::CandidatePlan;
use super::roots::RootSelectionStage;
use super::validate::Validator;
use super::{ClassifyRequest, ClassifyResponse, Issue, Stage};

/// Where a classify request is in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    RootsRequested,
    RootsValidated,
    LeavesRequested,
    LeavesValidated,
    Done,
    Failed,
}

impl PipelineState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Init, RootsRequested)
                | (Init, Failed)
                | (RootsRequested, RootsValidated)
                | (RootsRequested, Failed)
                | (RootsValidated, LeavesRequested)
                | (RootsValidated, Done)
                | (LeavesRequested, LeavesValidated)
                | (LeavesRequested, Failed)
                | (LeavesValidated, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

/// Outcome of one request: the response plus the states it went through.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub response: ClassifyResponse,
    pub state: PipelineState,
    pub history: Vec<PipelineState>,
}

struct Tracker {
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl Tracker {
    fn new() -> Self {
        Self {
            state: PipelineState::Init,
            history: vec![PipelineState::Init],
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "pipeline transition");
        self.state = next;
        self.history.push(next);
    }

    fn finish(self, response: ClassifyResponse) -> PipelineRun {
        PipelineRun {
            response,
            state: self.state,
            history: self.history,
        }
    }

    fn fail(mut self, error: Issue, warnings: Vec<Issue>) -> PipelineRun {
        self.advance(PipelineState::Failed);
        self.finish(ClassifyResponse::failed(error, warnings))
    }
}

fn oracle_issue(e: &OracleError) -> Issue {
    Issue::new(e.stage(), e.to_string())
}

/// Classification service: immutable configuration plus a shared oracle.
///
/// Cheap to clone; every request gets its own graph, caches and accumulators,
/// so one pipeline serves any number of concurrent requests.
#[derive(Clone)]
pub struct ClassificationPipeline {
    config: Arc<ServiceConfig>,
    oracle: Arc<dyn Oracle>,
}

impl ClassificationPipeline {
    pub fn new(config: ServiceConfig, oracle: Arc<dyn Oracle>) -> Self {
        Self {
            config: Arc::new(config),
            oracle,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn oracle(&self) -> &Arc<dyn Oracle> {
        &self.oracle
    }

    /// Classify a request.
    pub async fn classify(&self, request: &ClassifyRequest) -> ClassifyResponse {
        self.run(request).await.response
    }

    /// Classify a request and report the final pipeline state.
    pub async fn run(&self, request: &ClassifyRequest) -> PipelineRun {
        let selection_config = &self.config.selection;
        let mut tracker = Tracker::new();

        tracing::info!(
            concepts = request.scoped_concepts().len(),
            event = request.classifies_event(),
            mode = ?request.mode,
            scope = %request.scope,
            oracle = self.oracle.name(),
            "classify started"
        );

        let graph = TaxonomyGraph::new(&request.snapshot);
        let roots = RootSelectionStage::new(&graph, selection_config);

        if !roots.has_roots() {
            tracing::warn!(classes = graph.class_count(), "snapshot has no root classes");
            return tracker.fail(
                Issue::validation("snapshot has no root classes"),
                Vec::new(),
            );
        }
        if !self.oracle.is_enabled() {
            tracing::warn!(oracle = self.oracle.name(), "oracle disabled");
            return tracker.fail(oracle_issue(&OracleError::Disabled), Vec::new());
        }

        let mut warnings = Vec::new();
        if graph.has_cycle() {
            tracing::warn!("subclass graph contains a cycle; traversal stops at revisits");
            warnings.push(Issue::validation("subclass graph contains a cycle"));
        }

        // ── Stage 1: roots ──
        tracker.advance(PipelineState::RootsRequested);
        let raw_roots = match self.oracle.select_roots(&roots.query(request)).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "root selection call failed");
                return tracker.fail(oracle_issue(&e), warnings);
            }
        };
        let mut selection = roots.select(request, raw_roots);
        warnings.append(&mut selection.warnings);
        tracker.advance(PipelineState::RootsValidated);

        // ── Stage 2: leaves ──
        let mut plan = CandidatePlan::build(&graph, &selection, selection_config.max_leaves_per_root);
        warnings.append(&mut plan.warnings);
        if plan.is_empty() {
            tracing::info!(warnings = warnings.len(), "no leaf candidates left; skipping leaf call");
            tracker.advance(PipelineState::Done);
            return tracker.finish(ClassifyResponse::empty(warnings));
        }

        tracker.advance(PipelineState::LeavesRequested);
        let raw_leaves = match self.oracle.classify_leaves(&plan.query(request)).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "leaf classification call failed");
                return tracker.fail(oracle_issue(&e), warnings);
            }
        };
        tracker.advance(PipelineState::LeavesValidated);

        let response = Validator::new(
            request,
            &graph,
            &plan,
            selection_config.dropped_sample_limit,
        )
        .repair(raw_leaves, warnings);
        tracker.advance(PipelineState::Done);

        tracing::info!(
            ok = response.ok,
            classifications = response.classifications.len(),
            event_activities = response.event_activities.len(),
            warnings = response.warnings.len(),
            "classify finished"
        );
        tracker.finish(response)
    }

    /// Propose taxonomy additions for competency questions.
    pub async fn propose(&self, request: &ProposeRequest) -> ProposeResponse {
        crate::propose::propose(self.oracle.as_ref(), request, &self.config.selection).await
    }
}

impl std::fmt::Debug for ClassificationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationPipeline")
            .field("oracle", &self.oracle.name())
            .field("selection", &self.config.selection)
            .finish()
    }
}

/// Whether a response failed on an oracle call rather than validation.
pub fn failed_on_oracle(response: &ClassifyResponse) -> bool {
    response
        .errors
        .iter()
        .any(|e| matches!(e.stage, Stage::LlmCall | Stage::Disabled))
}
