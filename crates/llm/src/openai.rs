//! OpenAI Provider
//!
//! Implementation of the LlmProvider trait for OpenAI's chat-completions API.
//! The request/response wire helpers are shared with the other
//! OpenAI-compatible adapters (DeepSeek, LM Studio).

use async_trait::async_trait;
use serde::Deserialize;

use qualinsight_core::prompt::StructuredPrompt;

use super::http_client::build_http_client;
use super::provider::{
    map_request_error, missing_api_key_error, parse_http_error, parse_retry_after, LlmProvider,
};
use super::types::{Completion, LlmResult, ProviderConfig, ProviderError, RequestOptions, UsageStats};

/// Default OpenAI chat-completions endpoint
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Endpoint used to validate the API key
const OPENAI_MODELS_URL: &str = "https://api.openai.com/v1/models";

/// OpenAI provider
#[derive(Debug)]
pub struct OpenAiProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        let client = build_http_client(config.timeout_ms);
        Self { config, client }
    }

    fn base_url(&self) -> &str {
        self.config.endpoint.as_deref().unwrap_or(OPENAI_API_URL)
    }
}

/// Build a chat-completions request body from the normalized prompt.
///
/// Shared across the OpenAI-compatible adapters. `json_mode` adds the native
/// `response_format` field; instruction-only providers pass false.
pub(crate) fn build_chat_body(
    config: &ProviderConfig,
    prompt: &StructuredPrompt,
    options: &RequestOptions,
    json_mode: bool,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": config.model,
        "max_tokens": options.max_tokens_override.unwrap_or(config.max_tokens),
        "temperature": options.temperature_override.unwrap_or(config.temperature),
        "messages": [
            {"role": "system", "content": prompt.system},
            {"role": "user", "content": prompt.render_user()},
        ],
    });

    if json_mode && options.force_json {
        body["response_format"] = serde_json::json!({"type": "json_object"});
    }

    body
}

/// Chat-completions response format (the subset every compatible backend
/// returns)
#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Parse a chat-completions response body into the normalized completion.
pub(crate) fn parse_chat_response(
    body_text: &str,
    provider: &str,
    fallback_model: &str,
) -> LlmResult<Completion> {
    let response: ChatResponse =
        serde_json::from_str(body_text).map_err(|e| ProviderError::InvalidResponse {
            message: format!("{}: failed to parse response: {}", provider, e),
        })?;

    let content = response
        .choices
        .first()
        .and_then(|c| c.message.as_ref())
        .and_then(|m| m.content.clone())
        .ok_or_else(|| ProviderError::InvalidResponse {
            message: format!("{}: response contained no message content", provider),
        })?;

    let usage = response
        .usage
        .map(|u| UsageStats {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(Completion {
        content,
        model: response.model.unwrap_or_else(|| fallback_model.to_string()),
        usage,
    })
}

/// POST a chat-completions request and translate transport/status errors.
pub(crate) async fn send_chat_request(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &serde_json::Value,
    provider: &str,
    timeout_ms: u64,
) -> LlmResult<String> {
    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body);
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let response = request
        .send()
        .await
        .map_err(|e| map_request_error(e, provider, timeout_ms))?;

    let status = response.status().as_u16();
    if status != 200 {
        let retry_after = parse_retry_after(&response);
        let body_text = response.text().await.unwrap_or_default();
        return Err(parse_http_error(status, &body_text, provider, retry_after));
    }

    response
        .text()
        .await
        .map_err(|e| map_request_error(e, provider, timeout_ms))
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn supports_json_mode(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        prompt: &StructuredPrompt,
        options: &RequestOptions,
    ) -> LlmResult<Completion> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| missing_api_key_error("openai"))?;

        let body = build_chat_body(&self.config, prompt, options, true);
        let body_text = send_chat_request(
            &self.client,
            self.base_url(),
            Some(api_key),
            &body,
            "openai",
            self.config.timeout_ms,
        )
        .await?;

        parse_chat_response(&body_text, "openai", &self.config.model)
    }

    async fn health_check(&self) -> LlmResult<()> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| missing_api_key_error("openai"))?;

        // List models to verify the API key
        let response = self
            .client
            .get(OPENAI_MODELS_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .send()
            .await
            .map_err(|e| map_request_error(e, "openai", self.config.timeout_ms))?;

        let status = response.status().as_u16();
        if status == 200 {
            Ok(())
        } else {
            let retry_after = parse_retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            Err(parse_http_error(status, &body, "openai", retry_after))
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}
