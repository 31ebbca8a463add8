//! Insight Engine
//!
//! Per-segment deep analysis beyond coding: sentiment, discourse
//! (Toulmin), and narrative (Labov) readings of a single segment. Results
//! are returned to the caller and never alter segment state; they share the
//! coding engine's cache/retry/re-prompt path.

use std::sync::Arc;

use qualinsight_core::prompt::{
    discourse_prompt, narrative_prompt, parse_discourse, parse_narrative, parse_sentiment,
    sentiment_prompt, AnalysisMode, DiscourseOutcome, NarrativeOutcome, SentimentOutcome,
};
use qualinsight_core::{CoreError, SegmentKey};

use crate::error::EngineResult;
use crate::session::Session;

/// The insight engine. Cheap to construct; all state lives in the session.
pub struct InsightEngine {
    session: Arc<Session>,
}

impl InsightEngine {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn segment_text(&self, key: &SegmentKey) -> EngineResult<String> {
        let state = self.session.lock_state();
        Ok(state
            .segments
            .get(key)
            .ok_or_else(|| CoreError::not_found(format!("segment {}", key)))?
            .text
            .clone())
    }

    /// Sentiment reading of one segment.
    pub async fn sentiment(&self, key: &SegmentKey) -> EngineResult<SentimentOutcome> {
        let text = self.segment_text(key)?;
        self.session
            .complete_parsed(
                AnalysisMode::Sentiment,
                &sentiment_prompt(&text),
                parse_sentiment,
                "sentiment",
                &key.to_string(),
            )
            .await
    }

    /// Toulmin-model discourse reading of one segment.
    pub async fn discourse(&self, key: &SegmentKey) -> EngineResult<DiscourseOutcome> {
        let text = self.segment_text(key)?;
        self.session
            .complete_parsed(
                AnalysisMode::Discourse,
                &discourse_prompt(&text),
                parse_discourse,
                "discourse",
                &key.to_string(),
            )
            .await
    }

    /// Labov-model narrative reading of one segment.
    pub async fn narrative(&self, key: &SegmentKey) -> EngineResult<NarrativeOutcome> {
        let text = self.segment_text(key)?;
        self.session
            .complete_parsed(
                AnalysisMode::Narrative,
                &narrative_prompt(&text),
                parse_narrative,
                "narrative",
                &key.to_string(),
            )
            .await
    }
}
