//! LLM Provider Trait
//!
//! Defines the common interface for all LLM providers, plus the shared error
//! translation helpers and the configuration-driven factory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use qualinsight_core::prompt::StructuredPrompt;

use super::anthropic::AnthropicProvider;
use super::deepseek::DeepSeekProvider;
use super::lm_studio::LmStudioProvider;
use super::openai::OpenAiProvider;
use super::types::{
    Completion, LlmResult, ProviderConfig, ProviderError, RequestOptions,
};

/// Trait that all LLM providers must implement.
///
/// Adapters are single-shot: one `complete` call issues at most one request.
/// Retry policy lives above the adapter (see `retry`), and memoization lives
/// beside it (see `cache`).
#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the current model being used.
    fn model(&self) -> &str;

    /// Returns whether this provider has a native structured-output mode.
    ///
    /// When false, structured output is requested through instructions only.
    fn supports_json_mode(&self) -> bool {
        false
    }

    /// Send a structured prompt and get a complete response.
    async fn complete(
        &self,
        prompt: &StructuredPrompt,
        options: &RequestOptions,
    ) -> LlmResult<Completion>;

    /// Check if the provider is healthy and reachable.
    ///
    /// For API providers, this validates the API key. For the local server,
    /// this checks that it is running.
    async fn health_check(&self) -> LlmResult<()>;

    /// Get the configuration for this provider.
    fn config(&self) -> &ProviderConfig;
}

/// Helper function to create an error for missing API key
pub fn missing_api_key_error(provider: &str) -> ProviderError {
    ProviderError::Auth {
        message: format!("API key not configured for {}", provider),
    }
}

/// Helper function to translate HTTP error status codes into the shared
/// taxonomy.
pub fn parse_http_error(
    status: u16,
    body: &str,
    provider: &str,
    retry_after: Option<Duration>,
) -> ProviderError {
    match status {
        401 => ProviderError::Auth {
            message: format!("{}: invalid API key", provider),
        },
        403 => ProviderError::Auth {
            message: format!("{}: access denied", provider),
        },
        429 => ProviderError::RateLimited {
            message: format!("{}: {}", provider, body),
            retry_after,
        },
        500..=599 => ProviderError::Unavailable {
            message: format!("{}: HTTP {}: {}", provider, status, body),
        },
        _ => ProviderError::InvalidResponse {
            message: format!("{}: HTTP {}: {}", provider, status, body),
        },
    }
}

/// Translate a reqwest transport error into the shared taxonomy.
pub fn map_request_error(err: reqwest::Error, provider: &str, timeout_ms: u64) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout { timeout_ms }
    } else {
        ProviderError::Unavailable {
            message: format!("{}: {}", provider, err),
        }
    }
}

/// Parse a `Retry-After` header value given in whole seconds.
pub fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Build the configured provider.
///
/// A cloud provider without credentials fails fast here, before any request
/// is attempted; so does a malformed endpoint override.
pub fn create_provider(config: ProviderConfig) -> LlmResult<Arc<dyn LlmProvider>> {
    if config.provider.requires_api_key()
        && config
            .api_key
            .as_deref()
            .map_or(true, |key| key.trim().is_empty())
    {
        return Err(missing_api_key_error(config.provider.as_str()));
    }

    if let Some(endpoint) = &config.endpoint {
        url::Url::parse(endpoint).map_err(|e| ProviderError::Unavailable {
            message: format!("invalid endpoint URL {}: {}", endpoint, e),
        })?;
    }

    Ok(match config.provider {
        super::types::ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config)),
        super::types::ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(config)),
        super::types::ProviderKind::DeepSeek => Arc::new(DeepSeekProvider::new(config)),
        super::types::ProviderKind::LmStudio => Arc::new(LmStudioProvider::new(config)),
    })
}
