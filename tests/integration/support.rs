//! Shared test support: a scripted mock provider and session builders.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use qualinsight::core::prompt::StructuredPrompt;
use qualinsight::core::TextSegment;
use qualinsight::llm::{
    Completion, LlmProvider, LlmResult, ProviderConfig, ProviderError, RequestOptions, RetryPolicy,
};
use qualinsight::{Session, SessionConfig};

/// Scripted in-memory provider. Responses are popped front-first; when the
/// script is empty the default response (if any) is served.
pub struct MockProvider {
    config: ProviderConfig,
    calls: AtomicU32,
    delay: Option<Duration>,
    script: Mutex<VecDeque<LlmResult<Completion>>>,
    default_response: Option<String>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            config: ProviderConfig::default(),
            calls: AtomicU32::new(0),
            delay: None,
            script: Mutex::new(VecDeque::new()),
            default_response: None,
        }
    }

    /// Serve this content whenever the script runs dry.
    pub fn with_default_response(mut self, content: impl Into<String>) -> Self {
        self.default_response = Some(content.into());
        self
    }

    /// Sleep before answering, to widen concurrency windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_ok(self, content: impl Into<String>) -> Self {
        self.enqueue_ok(content);
        self
    }

    pub fn push_err(self, err: ProviderError) -> Self {
        self.script.lock().unwrap().push_back(Err(err));
        self
    }

    /// Script a response after construction (e.g. once generated ids are
    /// known).
    pub fn enqueue_ok(&self, content: impl Into<String>) {
        self.script.lock().unwrap().push_back(Ok(completion(content)));
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(
        &self,
        _prompt: &StructuredPrompt,
        _options: &RequestOptions,
    ) -> LlmResult<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => match &self.default_response {
                Some(content) => Ok(completion(content.clone())),
                None => Err(ProviderError::InvalidResponse {
                    message: "mock: script exhausted".to_string(),
                }),
            },
        }
    }

    async fn health_check(&self) -> LlmResult<()> {
        Ok(())
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

pub fn completion(content: impl Into<String>) -> Completion {
    Completion {
        content: content.into(),
        model: "local-model".to_string(),
        usage: Default::default(),
    }
}

/// A session wired to the given mock, with near-zero retry pacing.
pub fn session_with(provider: Arc<MockProvider>) -> Arc<Session> {
    let config = SessionConfig {
        research_question: "How do participants experience remote work?".to_string(),
        methodology: "thematic analysis".to_string(),
        retry: Some(RetryPolicy::immediate(3)),
        ..SessionConfig::default()
    };
    Session::with_provider(config, provider)
}

/// Two cases with two segments each.
pub fn sample_segments() -> Vec<TextSegment> {
    vec![
        TextSegment::new("case-1", "s1", "I was worried about losing touch with my team."),
        TextSegment::new("case-1", "s2", "My manager checked in every week, which helped."),
        TextSegment::new("case-2", "s1", "Honestly the quiet at home let me focus."),
        TextSegment::new("case-2", "s2", "I missed the hallway conversations the most."),
    ]
}

/// A coding response body with the given labels, each marked new.
pub fn coding_response(labels: &[&str]) -> String {
    let suggestions: Vec<String> = labels
        .iter()
        .map(|label| {
            format!(
                r#"{{"label": "{}", "definition": "about {}", "confidence": 0.8,
                    "rationale": "grounded in the text", "evidence": "quote", "is_new": true}}"#,
                label, label
            )
        })
        .collect();
    format!(r#"{{"suggested_codes": [{}]}}"#, suggestions.join(","))
}
