//! Anthropic Provider
//!
//! Implementation of the LlmProvider trait for Anthropic's Messages API.
//! Anthropic has no native JSON mode; structured output is requested through
//! instructions only.

use async_trait::async_trait;
use serde::Deserialize;

use qualinsight_core::prompt::StructuredPrompt;

use super::http_client::build_http_client;
use super::provider::{
    map_request_error, missing_api_key_error, parse_http_error, parse_retry_after, LlmProvider,
};
use super::types::{Completion, LlmResult, ProviderConfig, ProviderError, RequestOptions, UsageStats};

/// Default Anthropic messages endpoint
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
/// Pinned API version header
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic provider
#[derive(Debug)]
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        let client = build_http_client(config.timeout_ms);
        Self { config, client }
    }

    fn base_url(&self) -> &str {
        self.config.endpoint.as_deref().unwrap_or(ANTHROPIC_API_URL)
    }

    /// Build the request body for the Messages API. The system instruction is
    /// a top-level field rather than a message.
    fn build_request_body(
        &self,
        prompt: &StructuredPrompt,
        options: &RequestOptions,
        max_tokens: Option<u32>,
    ) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "max_tokens": max_tokens
                .or(options.max_tokens_override)
                .unwrap_or(self.config.max_tokens),
            "temperature": options.temperature_override.unwrap_or(self.config.temperature),
            "system": prompt.system,
            "messages": [
                {"role": "user", "content": prompt.render_user()},
            ],
        })
    }

    async fn send(&self, body: &serde_json::Value, api_key: &str) -> LlmResult<String> {
        let response = self
            .client
            .post(self.base_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| map_request_error(e, "anthropic", self.config.timeout_ms))?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = parse_retry_after(&response);
            let body_text = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status, &body_text, "anthropic", retry_after));
        }

        response
            .text()
            .await
            .map_err(|e| map_request_error(e, "anthropic", self.config.timeout_ms))
    }

    fn parse_response(&self, body_text: &str) -> LlmResult<Completion> {
        let response: AnthropicResponse =
            serde_json::from_str(body_text).map_err(|e| ProviderError::InvalidResponse {
                message: format!("anthropic: failed to parse response: {}", e),
            })?;

        let content: String = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        if content.is_empty() {
            return Err(ProviderError::InvalidResponse {
                message: "anthropic: response contained no text content".to_string(),
            });
        }

        let usage = response
            .usage
            .map(|u| UsageStats {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
            })
            .unwrap_or_default();

        Ok(Completion {
            content,
            model: response.model.unwrap_or_else(|| self.config.model.clone()),
            usage,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(
        &self,
        prompt: &StructuredPrompt,
        options: &RequestOptions,
    ) -> LlmResult<Completion> {
        let api_key = self
            .config
            .api_key
            .clone()
            .ok_or_else(|| missing_api_key_error("anthropic"))?;

        let body = self.build_request_body(prompt, options, None);
        let body_text = self.send(&body, &api_key).await?;
        self.parse_response(&body_text)
    }

    async fn health_check(&self) -> LlmResult<()> {
        let api_key = self
            .config
            .api_key
            .clone()
            .ok_or_else(|| missing_api_key_error("anthropic"))?;

        // Minimal one-token request to validate the key
        let probe = StructuredPrompt {
            system: String::new(),
            user: "ping".to_string(),
            schema_hint: None,
        };
        let body = self.build_request_body(&probe, &RequestOptions::default(), Some(1));
        self.send(&body, &api_key).await.map(|_| ())
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Messages API response format
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: Option<String>,
    content: Vec<ContentBlock>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
