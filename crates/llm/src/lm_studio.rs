//! LM Studio Provider
//!
//! Local inference server speaking the OpenAI-compatible API, typically at
//! http://localhost:1234/v1. No credentials are required; a refused
//! connection is reported as the server not running.

use async_trait::async_trait;

use qualinsight_core::prompt::StructuredPrompt;

use super::http_client::build_http_client;
use super::openai::{build_chat_body, parse_chat_response, send_chat_request};
use super::provider::{map_request_error, parse_http_error, parse_retry_after, LlmProvider};
use super::types::{Completion, LlmResult, ProviderConfig, ProviderError, RequestOptions};

/// Default LM Studio API base (the OpenAI-compatible mount point)
const LM_STUDIO_BASE_URL: &str = "http://localhost:1234/v1";

/// LM Studio provider
#[derive(Debug)]
pub struct LmStudioProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl LmStudioProvider {
    /// Create a new LM Studio provider with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        let client = build_http_client(config.timeout_ms);
        Self { config, client }
    }

    /// The configured base URL with any trailing slash removed.
    fn base(&self) -> String {
        self.config
            .endpoint
            .as_deref()
            .unwrap_or(LM_STUDIO_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base())
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base())
    }

    /// Point a connection failure at the most likely cause.
    fn annotate_unavailable(&self, err: ProviderError) -> ProviderError {
        match err {
            ProviderError::Unavailable { message } => ProviderError::Unavailable {
                message: format!(
                    "{} (is LM Studio running at {}?)",
                    message,
                    self.base()
                ),
            },
            other => other,
        }
    }
}

#[async_trait]
impl LlmProvider for LmStudioProvider {
    fn name(&self) -> &'static str {
        "lm_studio"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(
        &self,
        prompt: &StructuredPrompt,
        options: &RequestOptions,
    ) -> LlmResult<Completion> {
        let body = build_chat_body(&self.config, prompt, options, false);
        let body_text = send_chat_request(
            &self.client,
            &self.completions_url(),
            None,
            &body,
            "lm_studio",
            self.config.timeout_ms,
        )
        .await
        .map_err(|e| self.annotate_unavailable(e))?;

        parse_chat_response(&body_text, "lm_studio", &self.config.model)
    }

    async fn health_check(&self) -> LlmResult<()> {
        let response = self
            .client
            .get(self.models_url())
            .send()
            .await
            .map_err(|e| {
                self.annotate_unavailable(map_request_error(
                    e,
                    "lm_studio",
                    self.config.timeout_ms,
                ))
            })?;

        let status = response.status().as_u16();
        if status == 200 {
            Ok(())
        } else {
            let retry_after = parse_retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            Err(parse_http_error(status, &body, "lm_studio", retry_after))
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}
