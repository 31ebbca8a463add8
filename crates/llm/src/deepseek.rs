//! DeepSeek Provider
//!
//! DeepSeek exposes an OpenAI-compatible chat-completions API at its own
//! endpoint, so this adapter reuses the shared wire helpers and only differs
//! in endpoint, identification, and health probing.

use async_trait::async_trait;

use qualinsight_core::prompt::StructuredPrompt;

use super::http_client::build_http_client;
use super::openai::{build_chat_body, parse_chat_response, send_chat_request};
use super::provider::{
    map_request_error, missing_api_key_error, parse_http_error, parse_retry_after, LlmProvider,
};
use super::types::{Completion, LlmResult, ProviderConfig, RequestOptions};

/// Default DeepSeek chat-completions endpoint
const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";
/// Endpoint used to validate the API key
const DEEPSEEK_MODELS_URL: &str = "https://api.deepseek.com/v1/models";

/// DeepSeek provider
#[derive(Debug)]
pub struct DeepSeekProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl DeepSeekProvider {
    /// Create a new DeepSeek provider with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        let client = build_http_client(config.timeout_ms);
        Self { config, client }
    }

    fn base_url(&self) -> &str {
        self.config.endpoint.as_deref().unwrap_or(DEEPSEEK_API_URL)
    }
}

#[async_trait]
impl LlmProvider for DeepSeekProvider {
    fn name(&self) -> &'static str {
        "deepseek"
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
            .ok_or_else(|| missing_api_key_error("deepseek"))?;

        let body = build_chat_body(&self.config, prompt, options, true);
        let body_text = send_chat_request(
            &self.client,
            self.base_url(),
            Some(api_key),
            &body,
            "deepseek",
            self.config.timeout_ms,
        )
        .await?;

        parse_chat_response(&body_text, "deepseek", &self.config.model)
    }

    async fn health_check(&self) -> LlmResult<()> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| missing_api_key_error("deepseek"))?;

        let response = self
            .client
            .get(DEEPSEEK_MODELS_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .send()
            .await
            .map_err(|e| map_request_error(e, "deepseek", self.config.timeout_ms))?;

        let status = response.status().as_u16();
        if status == 200 {
            Ok(())
        } else {
            let retry_after = parse_retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            Err(parse_http_error(status, &body, "deepseek", retry_after))
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}
