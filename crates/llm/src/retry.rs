//! Retry Policy
//!
//! Exponential backoff around single-shot provider calls. Transient errors
//! (rate limits, timeouts, outages) are retried up to the configured attempt
//! count, bounded by a hard elapsed-time ceiling; auth failures and invalid
//! responses surface immediately.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;

use qualinsight_core::prompt::StructuredPrompt;

use super::provider::LlmProvider;
use super::types::{Completion, LlmResult, ProviderConfig, ProviderError, RequestOptions};

/// Backoff parameters for one logical provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (3 means two retries).
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Hard ceiling on the sum of all attempts and waits.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            max_elapsed: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Derive the policy from a provider config's `max_retries`.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            ..Self::default()
        }
    }

    /// A policy with near-zero waits, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            max_elapsed: Duration::from_secs(5),
        }
    }
}

/// Call the provider, retrying transient failures with exponential backoff.
///
/// A `RateLimited` error carrying `retry_after` overrides the computed
/// backoff interval for that wait.
pub async fn complete_with_retry(
    provider: &dyn LlmProvider,
    prompt: &StructuredPrompt,
    options: &RequestOptions,
    policy: &RetryPolicy,
) -> LlmResult<Completion> {
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_interval)
        .with_max_interval(policy.max_interval)
        .with_max_elapsed_time(Some(policy.max_elapsed))
        .build();

    let attempt = AtomicU32::new(0u32);

    backoff::future::retry(backoff, || async {
        let n = attempt.fetch_add(1, Ordering::Relaxed) + 1;
        match provider.complete(prompt, options).await {
            Ok(completion) => Ok(completion),
            Err(err) => {
                if err.is_transient() && n < policy.max_attempts {
                    tracing::warn!(
                        provider = provider.name(),
                        attempt = n,
                        max_attempts = policy.max_attempts,
                        error = %err,
                        "transient provider error, retrying"
                    );
                    let retry_after = match &err {
                        ProviderError::RateLimited { retry_after, .. } => *retry_after,
                        _ => None,
                    };
                    Err(backoff::Error::Transient { err, retry_after })
                } else {
                    Err(backoff::Error::Permanent(err))
                }
            }
        }
    })
    .await
}
