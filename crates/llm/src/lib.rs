//! QualInsight LLM
//!
//! Provides a unified interface for the LLM backends driving the analysis
//! engines:
//! - OpenAI
//! - Anthropic Claude
//! - DeepSeek
//! - LM Studio (local inference)
//!
//! Also includes the retry policy applied above every adapter, the
//! session-scoped request cache with its single-flight guarantee, and the
//! HTTP client factory.

pub mod anthropic;
pub mod cache;
pub mod deepseek;
pub mod http_client;
pub mod lm_studio;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod types;

// Re-export main types
pub use anthropic::AnthropicProvider;
pub use cache::{fingerprint, CacheEntryInfo, CacheStats, RequestCache};
pub use deepseek::DeepSeekProvider;
pub use http_client::build_http_client;
pub use lm_studio::LmStudioProvider;
pub use openai::OpenAiProvider;
pub use provider::{create_provider, missing_api_key_error, parse_http_error, LlmProvider};
pub use retry::{complete_with_retry, RetryPolicy};
pub use types::*;
