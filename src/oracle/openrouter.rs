//! HTTP oracle over an OpenAI-compatible chat-completions API (OpenRouter by default).
//!
//! Root selection runs on the configured lite model, leaf classification and
//! propose on the default model. Every call asks for a JSON object, at
//! temperature from config (0 by default), and the reply content is parsed into
//! the expected wire type. Calls are plain `reqwest` futures: dropping one
//! aborts the request, and the client-level timeout surfaces as
//! [`OracleError::Timeout`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::OracleConfig;
use crate::propose::{ProposalDraft, ProposeRequest};

use super::prompts::{
    LEAF_SYSTEM_PROMPT, LEAF_USER_TEMPLATE, PROPOSE_SYSTEM_PROMPT, PROPOSE_USER_TEMPLATE,
    ROOT_SYSTEM_PROMPT, ROOT_USER_TEMPLATE, render,
};
use super::{
    LeafClassificationQuery, LeafClassificationResponse, Oracle, OracleError, OracleResult,
    RootSelectionQuery, RootSelectionResponse,
};

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

/// Oracle backed by an OpenAI-compatible HTTP endpoint.
#[derive(Clone)]
pub struct OpenRouterOracle {
    config: OracleConfig,
    client: Client,
}

impl OpenRouterOracle {
    /// Build the client. Does not contact the endpoint.
    pub fn new(config: OracleConfig) -> OracleResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Transport {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn map_send_error(&self, e: reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Timeout {
                timeout_secs: self.config.timeout_secs,
            }
        } else {
            OracleError::Transport {
                message: e.to_string(),
            }
        }
    }

    /// One chat round trip whose reply content must be a JSON `T`.
    async fn complete_json<T: DeserializeOwned + Send>(
        &self,
        model: &str,
        system: &str,
        user: String,
    ) -> OracleResult<T> {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => key,
            _ => return Err(OracleError::Disabled),
        };

        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": self.config.temperature,
            "response_format": {"type": "json_object"},
        });

        tracing::debug!(model, endpoint = %self.endpoint(), "calling oracle");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let text = response.text().await.map_err(|e| self.map_send_error(e))?;
        let completion: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| OracleError::Parse {
                message: format!("invalid completion envelope: {e}"),
            })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::Parse {
                message: "completion has no message content".into(),
            })?;

        parse_content(&content)
    }
}

/// Parse a reply body into `T`, tolerating code fences and surrounding prose.
pub(crate) fn parse_content<T: DeserializeOwned>(content: &str) -> OracleResult<T> {
    let json = extract_json_object(content).ok_or_else(|| OracleError::Parse {
        message: "no JSON object found in response".into(),
    })?;
    serde_json::from_str(json).map_err(|e| OracleError::Parse {
        message: format!("JSON parse error: {e}"),
    })
}

/// Slice out the outermost `{ ... }` of a model reply.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn payload<T: serde::Serialize>(value: &T) -> OracleResult<String> {
    serde_json::to_string(value).map_err(|e| OracleError::Parse {
        message: format!("JSON serialize error: {e}"),
    })
}

#[async_trait]
impl Oracle for OpenRouterOracle {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn is_enabled(&self) -> bool {
        self.config.has_credentials()
    }

    async fn select_roots(&self, query: &RootSelectionQuery) -> OracleResult<RootSelectionResponse> {
        let user = render(ROOT_USER_TEMPLATE, &payload(query)?);
        self.complete_json(&self.config.lite_model, ROOT_SYSTEM_PROMPT, user)
            .await
    }

    async fn classify_leaves(
        &self,
        query: &LeafClassificationQuery,
    ) -> OracleResult<LeafClassificationResponse> {
        let user = render(LEAF_USER_TEMPLATE, &payload(query)?);
        self.complete_json(&self.config.model, LEAF_SYSTEM_PROMPT, user)
            .await
    }

    async fn propose(&self, request: &ProposeRequest) -> OracleResult<ProposalDraft> {
        let user = render(PROPOSE_USER_TEMPLATE, &payload(request)?);
        self.complete_json(&self.config.model, PROPOSE_SYSTEM_PROMPT, user)
            .await
    }
}

impl std::fmt::Debug for OpenRouterOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterOracle")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("lite_model", &self.config.lite_model)
            .field("enabled", &self.config.has_credentials())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Mode, Scope};
    use crate::oracle::RootSelectionResponse;

    fn root_query() -> RootSelectionQuery {
        RootSelectionQuery {
            mode: Mode::ExistingOnly,
            scope: Scope::Both,
            root_o_classes: vec![],
            concept_root_o_classes: vec![],
            event_root_o_classes: vec![],
            concepts: vec![],
            event_title: Some("Climbing with Alice".into()),
            event_normalized_text_en: None,
        }
    }

    #[test]
    fn extract_json_from_fenced_reply() {
        let reply = "```json\n{\"eventRoots\": []}\n```";
        assert_eq!(extract_json_object(reply), Some("{\"eventRoots\": []}"));
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn parse_content_reports_parse_errors() {
        let parsed: RootSelectionResponse =
            parse_content("Sure! {\"eventRoots\": [{\"oClassId\": \"A_Activity\", \"confidence\": 0.9}]}")
                .unwrap();
        assert_eq!(parsed.event_roots[0].o_class_id, "A_Activity");

        let err = parse_content::<RootSelectionResponse>("{\"eventRoots\": 7}").unwrap_err();
        assert!(matches!(err, OracleError::Parse { .. }));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("짬뽕짬뽕", 2), "짬뽕...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[tokio::test]
    async fn missing_key_is_disabled() {
        let oracle = OpenRouterOracle::new(OracleConfig::default()).unwrap();
        assert!(!oracle.is_enabled());
        let err = oracle.select_roots(&root_query()).await.unwrap_err();
        assert!(matches!(err, OracleError::Disabled));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_failure() {
        let oracle = OpenRouterOracle::new(OracleConfig {
            base_url: "http://127.0.0.1:1".into(), // unreachable port
            api_key: Some("sk-test".into()),
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap();
        let err = oracle.select_roots(&root_query()).await.unwrap_err();
        assert!(matches!(
            err,
            OracleError::Transport { .. } | OracleError::Timeout { .. }
        ));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let oracle = OpenRouterOracle::new(OracleConfig {
            base_url: "https://openrouter.ai/api/v1/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            oracle.endpoint(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }
}
