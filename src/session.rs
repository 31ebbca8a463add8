//! Analysis Session
//!
//! The explicit session context object passed to every engine. It owns the
//! mutable session state behind a single session-wide lock, the configured
//! provider, and the request cache. Created at session start, discarded at
//! session end; there is no static or module-level mutable state.
//!
//! Locking discipline: structural mutations hold the state lock for the
//! duration of one logical operation. LLM calls never run under the lock, so
//! batch analysis can keep several provider round trips in flight while the
//! forests stay consistent.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use qualinsight_core::prompt::{AnalysisMode, StructuredPrompt};
use qualinsight_core::{CoreError, CoreResult, SegmentKey, SegmentStatus, SessionState, TextSegment};
use qualinsight_llm::{
    complete_with_retry, create_provider, fingerprint, CacheStats, Completion, LlmProvider,
    ProviderConfig, RequestCache, RequestOptions, RetryPolicy,
};

use crate::error::{EngineError, EngineResult};

/// Session-level configuration handed in at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Guides every coding and theme prompt.
    #[serde(default)]
    pub research_question: String,
    /// Optional methodological framing (e.g. "grounded theory").
    #[serde(default)]
    pub methodology: String,
    pub provider: ProviderConfig,
    /// Backoff pacing override; derived from `provider.max_retries` when
    /// absent.
    #[serde(skip)]
    pub retry: Option<RetryPolicy>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            research_question: String::new(),
            methodology: String::new(),
            provider: ProviderConfig::default(),
            retry: None,
        }
    }
}

/// One bounded working session. Engines share it via `Arc`.
pub struct Session {
    id: String,
    config: SessionConfig,
    retry: RetryPolicy,
    provider: Arc<dyn LlmProvider>,
    cache: RequestCache,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session with the provider selected by configuration.
    ///
    /// Fails fast (no request issued) when a cloud provider is configured
    /// without credentials.
    pub fn new(config: SessionConfig) -> EngineResult<Arc<Self>> {
        let provider = create_provider(config.provider.clone())
            .map_err(|e| EngineError::provider("create_provider", config.provider.provider.as_str(), e))?;
        Ok(Self::with_provider(config, provider))
    }

    /// Create a session around an externally constructed provider. Used by
    /// tests and by callers that manage provider lifetime themselves.
    pub fn with_provider(config: SessionConfig, provider: Arc<dyn LlmProvider>) -> Arc<Self> {
        let retry = config
            .retry
            .clone()
            .unwrap_or_else(|| RetryPolicy::from_config(&config.provider));
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            config,
            retry,
            provider,
            cache: RequestCache::new(),
            state: Mutex::new(SessionState::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Lock the mutable session state. Poisoned locks are recovered; the
    /// forests validate their own invariants on every mutation.
    pub fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Import boundary ────────────────────────────────────────────────

    /// Import segments from the data-preparation collaborator. Duplicate
    /// (case_id, segment_id) pairs are rejected before any analysis begins.
    pub fn load_segments(&self, segments: Vec<TextSegment>) -> EngineResult<usize> {
        let count = self.lock_state().load_segments(segments)?;
        tracing::info!(session = %self.id, count, "imported text segments");
        Ok(count)
    }

    /// Snapshot of all imported segments.
    pub fn segments(&self) -> Vec<TextSegment> {
        self.lock_state().segments.iter().cloned().collect()
    }

    pub fn segment_status(&self, key: &SegmentKey) -> SegmentStatus {
        self.lock_state().segment_status(key)
    }

    // ── Cache management ───────────────────────────────────────────────

    /// Explicit user action: drop every cached provider response.
    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::info!(session = %self.id, "request cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ── Provider plumbing shared by the engines ────────────────────────

    /// One cached, retried provider round trip.
    pub(crate) async fn complete(
        &self,
        mode: AnalysisMode,
        prompt: &StructuredPrompt,
        operation: &'static str,
        context: &str,
    ) -> EngineResult<Completion> {
        let options = RequestOptions {
            force_json: prompt.schema_hint.is_some(),
            ..RequestOptions::default()
        };
        let key = fingerprint(
            self.provider.name(),
            self.provider.model(),
            mode.template_id(),
            prompt,
        );
        self.cache
            .get_or_compute(&key, || {
                complete_with_retry(self.provider.as_ref(), prompt, &options, &self.retry)
            })
            .await
            .map_err(|e| EngineError::provider(operation, context, e))
    }

    /// A provider round trip plus contract parsing.
    ///
    /// A malformed response triggers exactly one re-prompt with stricter
    /// formatting instructions before the parse error surfaces.
    pub(crate) async fn complete_parsed<T>(
        &self,
        mode: AnalysisMode,
        prompt: &StructuredPrompt,
        parse: fn(&str) -> CoreResult<T>,
        operation: &'static str,
        context: &str,
    ) -> EngineResult<T> {
        let completion = self.complete(mode, prompt, operation, context).await?;
        match parse(&completion.content) {
            Ok(value) => Ok(value),
            Err(CoreError::Parse(message)) => {
                tracing::warn!(
                    %mode,
                    context,
                    error = %message,
                    "malformed response, re-prompting with stricter formatting"
                );
                let strict = prompt.stricter();
                let completion = self.complete(mode, &strict, operation, context).await?;
                parse(&completion.content).map_err(EngineError::from)
            }
            Err(other) => Err(other.into()),
        }
    }
}
