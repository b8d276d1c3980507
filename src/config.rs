//! Service configuration: oracle endpoint and selection policy.
//!
//! Configuration is persisted as TOML and every field has a default, so an
//! empty file (or no file) is a valid configuration. Credentials and model ids
//! can be overridden from the environment:
//!
//! - `OPENROUTER_API_KEY`: API key; empty or unset means the oracle is disabled
//! - `OPENROUTER_BASE_URL`: OpenAI-compatible API base URL
//! - `OPENROUTER_MODEL`: default model (leaf classification, propose)
//! - `OPENROUTER_LITE_MODEL`: lite model (root selection)

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
}

/// Connection settings for the external reasoning endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key. `None` disables the oracle.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model used for leaf classification and propose.
    #[serde(default = "default_model")]
    pub model: String,
    /// Cheaper model used for root selection.
    #[serde(default = "default_lite_model")]
    pub lite_model: String,
    /// Per-call HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f32,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o".into()
}
fn default_lite_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            lite_model: default_lite_model(),
            timeout_secs: default_timeout_secs(),
            temperature: 0.0,
        }
    }
}

impl OracleConfig {
    /// Whether credentials are configured.
    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Search-space narrowing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Root candidates below this confidence are dropped unless all are below it.
    #[serde(default = "default_min_root_confidence")]
    pub min_root_confidence: f32,
    /// Maximum roots kept per concept or event.
    #[serde(default = "default_max_roots")]
    pub max_roots: usize,
    /// Maximum leaf views sent per root.
    #[serde(default = "default_max_leaves_per_root")]
    pub max_leaves_per_root: usize,
    /// Maximum dropped items echoed in a warning.
    #[serde(default = "default_dropped_sample_limit")]
    pub dropped_sample_limit: usize,
    /// Facet of the roots the event title may be classified under.
    #[serde(default = "default_event_facet")]
    pub event_facet: String,
}

fn default_min_root_confidence() -> f32 {
    0.4
}
fn default_max_roots() -> usize {
    5
}
fn default_max_leaves_per_root() -> usize {
    200
}
fn default_dropped_sample_limit() -> usize {
    50
}
fn default_event_facet() -> String {
    "Activity".into()
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_root_confidence: default_min_root_confidence(),
            max_roots: default_max_roots(),
            max_leaves_per_root: default_max_leaves_per_root(),
            dropped_sample_limit: default_dropped_sample_limit(),
            event_facet: default_event_facet(),
        }
    }
}

impl ServiceConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load from `path` if given (defaults otherwise), apply environment
    /// overrides, and validate.
    pub fn resolve(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `OPENROUTER_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENROUTER_API_KEY") {
            self.oracle.api_key = Some(key).filter(|k| !k.trim().is_empty());
        }
        if let Some(url) = lookup("OPENROUTER_BASE_URL") {
            self.oracle.base_url = url;
        }
        if let Some(model) = lookup("OPENROUTER_MODEL") {
            self.oracle.model = model;
        }
        if let Some(model) = lookup("OPENROUTER_LITE_MODEL") {
            self.oracle.lite_model = model;
        }
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        let s = &self.selection;
        if !(0.0..=1.0).contains(&s.min_root_confidence) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "selection.min_root_confidence must be within [0, 1], got {}",
                    s.min_root_confidence
                ),
            });
        }
        if s.max_roots == 0 || s.max_leaves_per_root == 0 {
            return Err(ConfigError::Invalid {
                message: "selection.max_roots and selection.max_leaves_per_root must be > 0"
                    .into(),
            });
        }
        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "oracle.timeout_secs must be > 0".into(),
            });
        }
        Ok(())
    }
}
