// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # ontoclass
//!
//! Constrained hierarchical classification of short concept mentions and event
//! titles into a caller-supplied taxonomy, using an external language model as
//! an untrusted candidate oracle.
//!
//! ## Architecture
//!
//! - **Taxonomy** (`taxonomy`): snapshot model, petgraph DAG view, bounded subtree expansion
//! - **Classification** (`classify`): root selection → leaf classification → validation/repair
//! - **Oracle gateway** (`oracle`): async trait, OpenRouter HTTP client, scripted replay
//! - **Propose** (`propose`): taxonomy additions and query templates for competency questions
//!
//! Every oracle answer is validated against the snapshot before it reaches the
//! caller: labels are leaves of the roots chosen for the item, mode and scope
//! are enforced, and every removal is reported as a warning.
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ontoclass::classify::pipeline::ClassificationPipeline;
//! use ontoclass::classify::ClassifyRequest;
//! use ontoclass::config::ServiceConfig;
//! use ontoclass::oracle::openrouter::OpenRouterOracle;
//!
//! # async fn demo(request: ClassifyRequest) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::resolve(None)?;
//! let oracle = Arc::new(OpenRouterOracle::new(config.oracle.clone())?);
//! let pipeline = ClassificationPipeline::new(config, oracle);
//!
//! let response = pipeline.classify(&request).await;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod input;
pub mod oracle;
pub mod propose;
pub mod taxonomy;
