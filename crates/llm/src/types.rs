//! Shared LLM Types
//!
//! Provider error taxonomy, provider configuration, and the normalized
//! completion result returned by every adapter.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shared error taxonomy every adapter translates into.
///
/// `RateLimited`, `Timeout`, and `Unavailable` are transient and eligible for
/// retry above the adapter; `Auth` and `InvalidResponse` are permanent and
/// surface immediately.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Missing or rejected credentials
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// The provider throttled the request
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The request exceeded the configured per-call timeout
    #[error("Request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The provider answered with something the adapter cannot use
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// Network failure or provider-side outage
    #[error("Provider unavailable: {message}")]
    Unavailable { message: String },
}

impl ProviderError {
    /// Whether retrying can plausibly help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::Unavailable { .. }
        )
    }
}

/// Result type alias for provider operations
pub type LlmResult<T> = Result<T, ProviderError>;

/// The closed set of supported backends, selected by configuration at
/// session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    DeepSeek,
    #[serde(alias = "lmstudio")]
    LmStudio,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::LmStudio => "lm_studio",
        }
    }

    /// Cloud providers require credentials; the local server does not.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::LmStudio)
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-sonnet-20241022",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::LmStudio => "local-model",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "deepseek" => Ok(ProviderKind::DeepSeek),
            "lm_studio" | "lmstudio" => Ok(ProviderKind::LmStudio),
            other => Err(format!(
                "unsupported LLM provider: {}. Supported: openai, anthropic, deepseek, lm_studio",
                other
            )),
        }
    }
}

/// Recognized configuration per provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    /// Endpoint override; each adapter has a sensible default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Required for cloud providers, ignored by the local server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::LmStudio,
            endpoint: None,
            api_key: None,
            model: ProviderKind::LmStudio.default_model().to_string(),
            timeout_ms: 60_000,
            max_retries: 3,
            temperature: 0.3,
            max_tokens: 2_000,
        }
    }
}

impl ProviderConfig {
    /// A config for the given kind with its default model.
    pub fn for_kind(kind: ProviderKind) -> Self {
        Self {
            provider: kind,
            model: kind.default_model().to_string(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Per-call options layered over the provider config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub temperature_override: Option<f64>,
    pub max_tokens_override: Option<u32>,
    /// Ask the provider for native JSON mode when it supports one.
    pub force_json: bool,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Normalized completion returned by every adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub model: String,
    #[serde(default)]
    pub usage: UsageStats,
}
