//! Deterministic oracle that replays recorded responses.
//!
//! Used by tests to stub the reasoning step and by the CLI `--replay` flag to
//! run the pipeline offline against a recording. Missing recordings answer
//! with empty (but valid) responses. Failures can be injected per call kind.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::input::load_json;
use crate::propose::{ProposalDraft, ProposeRequest};

use super::{
    LeafClassificationQuery, LeafClassificationResponse, Oracle, OracleError, OracleResult,
    RootSelectionQuery, RootSelectionResponse,
};

/// Recorded oracle answers, as stored in a replay file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    #[serde(default)]
    pub roots: Option<RootSelectionResponse>,
    #[serde(default)]
    pub leaves: Option<LeafClassificationResponse>,
    #[serde(default)]
    pub propose: Option<ProposalDraft>,
}

impl Recording {
    /// Load a recording from a JSON file.
    pub fn load(path: &Path) -> Result<Self, RequestError> {
        load_json(path)
    }
}

/// Which call an injected failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Roots,
    Leaves,
    Propose,
}

/// Kind of failure to inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Transport(String),
    Parse(String),
    Timeout,
}

impl Failure {
    fn to_error(&self) -> OracleError {
        match self {
            Failure::Transport(message) => OracleError::Transport {
                message: message.clone(),
            },
            Failure::Parse(message) => OracleError::Parse {
                message: message.clone(),
            },
            Failure::Timeout => OracleError::Timeout { timeout_secs: 0 },
        }
    }
}

/// Replaying oracle with call counters and query capture.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    recording: Recording,
    enabled: bool,
    failures: Vec<(CallKind, Failure)>,
    delay: Option<Duration>,
    root_calls: AtomicUsize,
    leaf_calls: AtomicUsize,
    propose_calls: AtomicUsize,
    last_root_query: Mutex<Option<RootSelectionQuery>>,
    last_leaf_query: Mutex<Option<LeafClassificationQuery>>,
}

impl ScriptedOracle {
    /// An enabled oracle replaying `recording`.
    pub fn new(recording: Recording) -> Self {
        Self {
            recording,
            enabled: true,
            ..Default::default()
        }
    }

    /// An oracle without credentials.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_roots(mut self, roots: RootSelectionResponse) -> Self {
        self.recording.roots = Some(roots);
        self
    }

    pub fn with_leaves(mut self, leaves: LeafClassificationResponse) -> Self {
        self.recording.leaves = Some(leaves);
        self
    }

    pub fn with_propose(mut self, propose: ProposalDraft) -> Self {
        self.recording.propose = Some(propose);
        self
    }

    /// Fail every call of `kind` with `failure`.
    pub fn failing(mut self, kind: CallKind, failure: Failure) -> Self {
        self.failures.push((kind, failure));
        self
    }

    /// Sleep before answering, to exercise concurrency and cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls made of `kind`.
    pub fn calls(&self, kind: CallKind) -> usize {
        let counter = match kind {
            CallKind::Roots => &self.root_calls,
            CallKind::Leaves => &self.leaf_calls,
            CallKind::Propose => &self.propose_calls,
        };
        counter.load(Ordering::SeqCst)
    }

    /// The most recent root-selection query.
    pub fn last_root_query(&self) -> Option<RootSelectionQuery> {
        self.last_root_query
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// The most recent leaf-classification query.
    pub fn last_leaf_query(&self) -> Option<LeafClassificationQuery> {
        self.last_leaf_query
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    async fn answer(&self, kind: CallKind) -> OracleResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.enabled {
            return Err(OracleError::Disabled);
        }
        match self.failures.iter().find(|(k, _)| *k == kind) {
            Some((_, failure)) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn select_roots(&self, query: &RootSelectionQuery) -> OracleResult<RootSelectionResponse> {
        self.root_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut slot) = self.last_root_query.lock() {
            *slot = Some(query.clone());
        }
        self.answer(CallKind::Roots).await?;
        Ok(self.recording.roots.clone().unwrap_or_default())
    }

    async fn classify_leaves(
        &self,
        query: &LeafClassificationQuery,
    ) -> OracleResult<LeafClassificationResponse> {
        self.leaf_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut slot) = self.last_leaf_query.lock() {
            *slot = Some(query.clone());
        }
        self.answer(CallKind::Leaves).await?;
        Ok(self.recording.leaves.clone().unwrap_or_default())
    }

    async fn propose(&self, _request: &ProposeRequest) -> OracleResult<ProposalDraft> {
        self.propose_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(CallKind::Propose).await?;
        Ok(self.recording.propose.clone().unwrap_or_default())
    }
}
