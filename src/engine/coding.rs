//! Coding Engine
//!
//! Drives deductive and inductive coding over text segments and maintains
//! the hierarchical code forest. AI proposals flow through the session's
//! cache and retry policy; structural mutations run atomically under the
//! session lock.
//!
//! Duplicate policy: only case-insensitive, whitespace-normalized label
//! matches are treated as the same code. Near-duplicates are surfaced to the
//! human reviewer; the engine never merges on fuzzy similarity.

use std::sync::Arc;

use futures_util::{stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use qualinsight_core::prompt::{
    coding_rationale_prompt, deductive_prompt, inductive_prompt, parse_code_suggestions,
    AnalysisMode, CodeSuggestion, CodebookEntry,
};
use qualinsight_core::{
    normalize_label, ApplicationSource, Code, CodeApplication, CodeForest, CodeId, CoreError,
    CoreResult, SegmentKey, SegmentStatus, SessionState,
};

use crate::error::EngineResult;
use crate::session::Session;

/// How many provider calls a batch keeps in flight at once.
const MAX_CONCURRENT_PROVIDER_CALLS: usize = 4;

/// Coding direction for AI proposals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingMode {
    /// Apply the existing codebook only.
    Deductive,
    /// Open coding; new labels welcome.
    Inductive,
}

impl CodingMode {
    fn analysis_mode(&self) -> AnalysisMode {
        match self {
            CodingMode::Deductive => AnalysisMode::Deductive,
            CodingMode::Inductive => AnalysisMode::Inductive,
        }
    }
}

/// Result of one segment within a batch run.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub key: SegmentKey,
    pub result: BatchResult,
}

/// Per-segment outcome of a batch: errors are recorded, not propagated, so
/// one failing segment never aborts the rest.
#[derive(Debug, Clone)]
pub enum BatchResult {
    Proposed(Vec<CodeSuggestion>),
    Failed(String),
    Cancelled,
}

/// Aggregate usage statistics over the code forest.
#[derive(Debug, Clone, Serialize)]
pub struct CodingStats {
    pub total_codes: usize,
    pub total_applications: usize,
    pub avg_applications_per_code: f64,
    /// Sorted most-used first.
    pub codes_by_usage: Vec<CodeUsageCount>,
    pub unused_codes: Vec<CodeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeUsageCount {
    pub code_id: CodeId,
    pub label: String,
    pub count: usize,
}

/// The coding engine. Cheap to construct; all state lives in the session.
pub struct CodingEngine {
    session: Arc<Session>,
}

impl CodingEngine {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    // ── AI proposals ───────────────────────────────────────────────────

    /// Ask the provider for code suggestions on one segment.
    ///
    /// The segment moves Unanalyzed → Proposed. Inductive suggestions whose
    /// normalized label matches an existing code are folded onto it
    /// (`is_new` becomes false); deductive suggestions outside the allowed
    /// vocabulary are dropped with a warning.
    pub async fn propose_codes(
        &self,
        key: &SegmentKey,
        mode: CodingMode,
    ) -> EngineResult<Vec<CodeSuggestion>> {
        let (text, codebook) = {
            let state = self.session.lock_state();
            let segment = state
                .segments
                .get(key)
                .ok_or_else(|| CoreError::not_found(format!("segment {}", key)))?;
            let codebook: Vec<CodebookEntry> = state
                .codes
                .iter()
                .map(|code| CodebookEntry {
                    label: code.label.clone(),
                    definition: code.definition.clone(),
                })
                .collect();
            (segment.text.clone(), codebook)
        };

        let config = self.session.config();
        let prompt = match mode {
            CodingMode::Deductive => deductive_prompt(
                &config.research_question,
                &config.methodology,
                &codebook,
                &text,
            ),
            CodingMode::Inductive => {
                inductive_prompt(&config.research_question, &config.methodology, &text)
            }
        };

        let suggestions = self
            .session
            .complete_parsed(
                mode.analysis_mode(),
                &prompt,
                parse_code_suggestions,
                "propose_codes",
                &key.to_string(),
            )
            .await?;

        let mut state = self.session.lock_state();
        let deduped = dedupe_suggestions(suggestions, mode, &state.codes, key);
        if state.segment_status(key) == SegmentStatus::Unanalyzed {
            state.set_segment_status(key, SegmentStatus::Proposed);
        }
        Ok(deduped)
    }

    /// Batch-analyze many segments with bounded concurrency.
    ///
    /// Cancellation is cooperative and checked per segment before its
    /// provider call: results already applied stay valid, pending segments
    /// report `Cancelled` instead of being issued.
    pub async fn batch_propose(
        &self,
        keys: &[SegmentKey],
        mode: CodingMode,
        cancel: &CancellationToken,
    ) -> Vec<BatchOutcome> {
        let total = keys.len();
        let futures = keys.iter().enumerate().map(|(index, key)| {
            let key = key.clone();
            async move {
                if cancel.is_cancelled() {
                    return BatchOutcome {
                        key,
                        result: BatchResult::Cancelled,
                    };
                }
                tracing::debug!(segment = %key, index, total, "batch coding segment");
                match self.propose_codes(&key, mode).await {
                    Ok(suggestions) => BatchOutcome {
                        key,
                        result: BatchResult::Proposed(suggestions),
                    },
                    Err(err) => BatchOutcome {
                        key,
                        result: BatchResult::Failed(err.to_string()),
                    },
                }
            }
        });

        stream::iter(futures)
            .buffered(MAX_CONCURRENT_PROVIDER_CALLS)
            .collect()
            .await
    }

    /// Explain why a code was applied to a segment, for human review.
    pub async fn explain_application(
        &self,
        key: &SegmentKey,
        code_id: &CodeId,
    ) -> EngineResult<String> {
        let (text, label, definition) = {
            let state = self.session.lock_state();
            let segment = state
                .segments
                .get(key)
                .ok_or_else(|| CoreError::not_found(format!("segment {}", key)))?;
            let code = state
                .codes
                .get(code_id)
                .ok_or_else(|| CoreError::not_found(format!("code {}", code_id)))?;
            if state.applications.get(key, code_id).is_none() {
                return Err(CoreError::not_found(format!(
                    "no application of code {} on segment {}",
                    code_id, key
                ))
                .into());
            }
            (segment.text.clone(), code.label.clone(), code.definition.clone())
        };

        let prompt = coding_rationale_prompt(&label, &definition, &text);
        let completion = self
            .session
            .complete(
                AnalysisMode::ReliabilityRationale,
                &prompt,
                "explain_application",
                &format!("{} on {}", label, key),
            )
            .await?;
        Ok(completion.content.trim().to_string())
    }

    // ── Codebook mutations ─────────────────────────────────────────────

    /// Create a human-authored code. Palette color assigned when none given.
    pub fn add_code(
        &self,
        label: impl Into<String>,
        definition: impl Into<String>,
        parent: Option<&CodeId>,
        color: Option<String>,
    ) -> EngineResult<Code> {
        let mut state = self.session.lock_state();
        let color = color.unwrap_or_else(|| state.codes.next_color());
        let mut code = Code::new(label, definition).with_color(color);
        if let Some(parent_id) = parent {
            code = code.with_parent(parent_id.clone());
        }
        state.codes.insert(code.clone())?;
        Ok(code)
    }

    /// Accept an AI suggestion: find the matching code by normalized label
    /// or create it, then apply it to the segment. One atomic operation.
    pub fn accept_suggestion(
        &self,
        key: &SegmentKey,
        suggestion: &CodeSuggestion,
        source: ApplicationSource,
    ) -> EngineResult<Code> {
        let mut state = self.session.lock_state();
        if !state.segments.contains(key) {
            return Err(CoreError::not_found(format!("segment {}", key)).into());
        }

        let existing = state.codes.find_by_normalized_label(&suggestion.label).cloned();
        let code = match existing {
            Some(existing) => existing,
            None => {
                let color = state.codes.next_color();
                let code = Code::new(suggestion.label.clone(), suggestion.definition.clone())
                    .with_color(color);
                state.codes.insert(code.clone())?;
                code
            }
        };

        state.applications.upsert(
            CodeApplication::new(key.clone(), code.id.clone(), source)
                .with_confidence(suggestion.confidence)
                .with_rationale(suggestion.rationale.clone()),
        );
        if state.segment_status(key) == SegmentStatus::Unanalyzed {
            state.set_segment_status(key, SegmentStatus::Proposed);
        }
        Ok(code)
    }

    /// Apply an existing code to a segment (upsert semantics).
    pub fn apply_code(
        &self,
        key: &SegmentKey,
        code_id: &CodeId,
        source: ApplicationSource,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> EngineResult<()> {
        let mut state = self.session.lock_state();
        if !state.segments.contains(key) {
            return Err(CoreError::not_found(format!("segment {}", key)).into());
        }
        if !state.codes.contains(code_id) {
            return Err(CoreError::not_found(format!("code {}", code_id)).into());
        }
        state.applications.upsert(
            CodeApplication::new(key.clone(), code_id.clone(), source)
                .with_confidence(confidence)
                .with_rationale(rationale),
        );
        if state.segment_status(key) == SegmentStatus::Unanalyzed {
            state.set_segment_status(key, SegmentStatus::Proposed);
        }
        Ok(())
    }

    /// Detach a code from a segment.
    pub fn remove_application(&self, key: &SegmentKey, code_id: &CodeId) -> EngineResult<()> {
        let mut state = self.session.lock_state();
        state
            .applications
            .remove(key, code_id)
            .map(|_| ())
            .ok_or_else(|| {
                CoreError::not_found(format!(
                    "no application of code {} on segment {}",
                    code_id, key
                ))
                .into()
            })
    }

    /// Merge `loser` into `winner`: applications and children move to the
    /// winner, then the loser is deleted. A child colliding with an existing
    /// same-labelled child of the winner is absorbed recursively.
    pub fn merge_codes(&self, winner: &CodeId, loser: &CodeId) -> EngineResult<()> {
        let mut state = self.session.lock_state();
        merge_into(&mut state, winner, loser)?;
        tracing::info!(winner = %winner, loser = %loser, "merged codes");
        Ok(())
    }

    /// Move a code under a new parent. Cycle attempts are rejected.
    pub fn reparent_code(&self, code_id: &CodeId, new_parent: Option<&CodeId>) -> EngineResult<()> {
        let mut state = self.session.lock_state();
        state.codes.reparent(code_id, new_parent)?;
        Ok(())
    }

    pub fn rename_code(&self, code_id: &CodeId, label: impl Into<String>) -> EngineResult<()> {
        let mut state = self.session.lock_state();
        state.codes.rename(code_id, label)?;
        Ok(())
    }

    pub fn set_code_definition(
        &self,
        code_id: &CodeId,
        definition: impl Into<String>,
    ) -> EngineResult<()> {
        let mut state = self.session.lock_state();
        state.codes.set_definition(code_id, definition)?;
        Ok(())
    }

    /// Delete a code. With children present the deletion is rejected unless
    /// `cascade` is set, in which case the whole subtree goes, applications
    /// and theme memberships included.
    pub fn delete_code(&self, code_id: &CodeId, cascade: bool) -> EngineResult<()> {
        let mut state = self.session.lock_state();
        let removed = state.codes.remove(code_id, cascade)?;
        for rid in &removed {
            state.applications.remove_code(rid);
            state.themes.purge_code(rid);
        }
        Ok(())
    }

    // ── Review transitions ─────────────────────────────────────────────

    /// Human review accepts a segment's proposals.
    pub fn confirm(&self, key: &SegmentKey) -> EngineResult<()> {
        self.transition(key, SegmentStatus::Proposed, SegmentStatus::Confirmed)
    }

    /// Human review reopens a confirmed segment.
    pub fn demote(&self, key: &SegmentKey) -> EngineResult<()> {
        self.transition(key, SegmentStatus::Confirmed, SegmentStatus::Proposed)
    }

    fn transition(
        &self,
        key: &SegmentKey,
        expected: SegmentStatus,
        target: SegmentStatus,
    ) -> EngineResult<()> {
        let mut state = self.session.lock_state();
        if !state.segments.contains(key) {
            return Err(CoreError::not_found(format!("segment {}", key)).into());
        }
        let current = state.segment_status(key);
        if current != expected {
            return Err(CoreError::validation(format!(
                "segment {} is {} and cannot move to {}",
                key, current, target
            ))
            .into());
        }
        state.set_segment_status(key, target);
        Ok(())
    }

    // ── Derived statistics ─────────────────────────────────────────────

    pub fn coding_stats(&self) -> CodingStats {
        let state = self.session.lock_state();
        let mut codes_by_usage: Vec<CodeUsageCount> = state
            .codes
            .iter()
            .map(|code| CodeUsageCount {
                code_id: code.id.clone(),
                label: code.label.clone(),
                count: state.applications.usage_count(&code.id),
            })
            .collect();
        codes_by_usage.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

        let total_codes = state.codes.len();
        let total_applications = state.applications.len();
        let unused_codes = codes_by_usage
            .iter()
            .filter(|c| c.count == 0)
            .map(|c| c.code_id.clone())
            .collect();

        CodingStats {
            total_codes,
            total_applications,
            avg_applications_per_code: if total_codes == 0 {
                0.0
            } else {
                total_applications as f64 / total_codes as f64
            },
            codes_by_usage,
            unused_codes,
        }
    }
}

/// Fold suggestions onto the existing codebook and drop in-batch duplicates.
fn dedupe_suggestions(
    suggestions: Vec<CodeSuggestion>,
    mode: CodingMode,
    codes: &CodeForest,
    key: &SegmentKey,
) -> Vec<CodeSuggestion> {
    let mut seen: Vec<String> = Vec::new();
    let mut result = Vec::new();
    for mut suggestion in suggestions {
        let normalized = normalize_label(&suggestion.label);
        if seen.contains(&normalized) {
            continue;
        }
        match codes.find_by_normalized_label(&suggestion.label) {
            Some(existing) => {
                suggestion.is_new = false;
                suggestion.label = existing.label.clone();
            }
            None => {
                if mode == CodingMode::Deductive {
                    tracing::warn!(
                        segment = %key,
                        label = %suggestion.label,
                        "dropping deductive suggestion outside the allowed vocabulary"
                    );
                    continue;
                }
                suggestion.is_new = true;
            }
        }
        seen.push(normalized);
        result.push(suggestion);
    }
    result
}

/// Recursive merge worker operating under the session lock.
fn merge_into(state: &mut SessionState, winner: &CodeId, loser: &CodeId) -> CoreResult<()> {
    if winner == loser {
        return Err(CoreError::validation(format!(
            "cannot merge code {} into itself",
            winner
        )));
    }
    if !state.codes.contains(winner) {
        return Err(CoreError::not_found(format!("code {}", winner)));
    }
    if !state.codes.contains(loser) {
        return Err(CoreError::not_found(format!("code {}", loser)));
    }
    if state.codes.is_descendant(winner, loser) {
        return Err(CoreError::cycle(format!(
            "cannot merge code {} into its own descendant {}",
            loser, winner
        )));
    }

    state.applications.retarget(loser, winner);
    state.themes.replace_code(loser, winner);

    let children: Vec<(CodeId, String)> = state
        .codes
        .children(loser)
        .into_iter()
        .map(|c| (c.id.clone(), c.label.clone()))
        .collect();
    for (child_id, label) in children {
        let absorb_target = state
            .codes
            .find_child_by_normalized_label(Some(winner), &label)
            .map(|c| c.id.clone());
        match absorb_target {
            Some(existing) => merge_into(state, &existing, &child_id)?,
            None => state.codes.reparent(&child_id, Some(winner))?,
        }
    }

    state.codes.remove(loser, false)?;
    Ok(())
}
