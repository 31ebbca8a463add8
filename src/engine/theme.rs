//! Theme Engine
//!
//! Aggregates code usage across cases (frequency, co-occurrence, example
//! excerpts), asks the provider for theme proposals over that aggregation,
//! and maintains the theme forest. Cross-case salience is a derived view
//! computed on demand, never stored.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use qualinsight_core::prompt::{parse_theme_suggestions, theme_prompt, AnalysisMode, CodeUsage};
use qualinsight_core::{CodeId, CoreError, SessionState, Theme, ThemeId};

use crate::error::EngineResult;
use crate::session::Session;

/// Longest excerpt quoted into a theme prompt.
const EXCERPT_MAX_CHARS: usize = 240;
/// Example excerpts carried per code.
const MAX_EXCERPTS_PER_CODE: usize = 3;

/// Co-occurrence of two codes on the same segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoOccurrence {
    pub code_a: CodeId,
    pub code_b: CodeId,
    pub count: usize,
}

/// The theme engine. Cheap to construct; all state lives in the session.
pub struct ThemeEngine {
    session: Arc<Session>,
}

impl ThemeEngine {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    // ── AI proposals ───────────────────────────────────────────────────

    /// Ask the provider to group applied codes into themes, optionally
    /// restricted to a subset of cases.
    ///
    /// Member code ids the model invents are dropped with a warning rather
    /// than failing the proposal; surviving themes are inserted as roots.
    pub async fn propose_themes(
        &self,
        case_filter: Option<&[String]>,
    ) -> EngineResult<Vec<Theme>> {
        let usage = {
            let state = self.session.lock_state();
            aggregate_code_usage(&state, case_filter)
        };
        if usage.is_empty() {
            return Err(CoreError::insufficient_data(
                "no code applications to aggregate into themes",
            )
            .into());
        }

        let context = match case_filter {
            Some(cases) => format!("cases {}", cases.join(", ")),
            None => "all cases".to_string(),
        };
        let prompt = theme_prompt(&self.session.config().research_question, &usage);
        let suggestions = self
            .session
            .complete_parsed(
                AnalysisMode::Theme,
                &prompt,
                parse_theme_suggestions,
                "propose_themes",
                &context,
            )
            .await?;

        let mut state = self.session.lock_state();
        let state = &mut *state;
        let mut created = Vec::new();
        for suggestion in suggestions {
            let mut members = BTreeSet::new();
            for code_id in suggestion.code_ids {
                if state.codes.contains(&code_id) {
                    members.insert(code_id);
                } else {
                    tracing::warn!(
                        theme = %suggestion.label,
                        code_id = %code_id,
                        "dropping unknown code id from theme proposal"
                    );
                }
            }
            let theme = Theme::new(suggestion.label, suggestion.definition).with_codes(members);
            state.themes.insert(theme.clone(), &state.codes)?;
            created.push(theme);
        }
        Ok(created)
    }

    // ── Theme forest mutations ─────────────────────────────────────────

    /// Create a human-authored theme. Member codes must exist.
    pub fn add_theme(
        &self,
        label: impl Into<String>,
        definition: impl Into<String>,
        parent: Option<&ThemeId>,
        code_ids: impl IntoIterator<Item = CodeId>,
    ) -> EngineResult<Theme> {
        let mut state = self.session.lock_state();
        let state = &mut *state;
        let mut theme = Theme::new(label, definition).with_codes(code_ids);
        if let Some(parent_id) = parent {
            theme = theme.with_parent(parent_id.clone());
        }
        state.themes.insert(theme.clone(), &state.codes)?;
        Ok(theme)
    }

    pub fn delete_theme(&self, theme_id: &ThemeId, cascade: bool) -> EngineResult<()> {
        let mut state = self.session.lock_state();
        state.themes.remove(theme_id, cascade)?;
        Ok(())
    }

    /// Move a theme under a new parent. Cycle attempts are rejected.
    pub fn reparent_theme(
        &self,
        theme_id: &ThemeId,
        new_parent: Option<&ThemeId>,
    ) -> EngineResult<()> {
        let mut state = self.session.lock_state();
        state.themes.reparent(theme_id, new_parent)?;
        Ok(())
    }

    pub fn add_code_to_theme(&self, theme_id: &ThemeId, code_id: &CodeId) -> EngineResult<()> {
        let mut state = self.session.lock_state();
        let state = &mut *state;
        state
            .themes
            .add_code(theme_id, code_id.clone(), &state.codes)?;
        Ok(())
    }

    pub fn remove_code_from_theme(&self, theme_id: &ThemeId, code_id: &CodeId) -> EngineResult<()> {
        let mut state = self.session.lock_state();
        state.themes.remove_code(theme_id, code_id)?;
        Ok(())
    }

    // ── Derived views ──────────────────────────────────────────────────

    /// Per-case salience of a theme: the fraction of that case's code
    /// applications covered by the theme's member codes. Cases without
    /// applications are omitted.
    pub fn case_salience(&self, theme_id: &ThemeId) -> EngineResult<BTreeMap<String, f64>> {
        let state = self.session.lock_state();
        let theme = state
            .themes
            .get(theme_id)
            .ok_or_else(|| CoreError::not_found(format!("theme {}", theme_id)))?;

        let mut salience = BTreeMap::new();
        for case_id in state.segments.case_ids() {
            let mut total = 0usize;
            let mut covered = 0usize;
            for application in state.applications.for_case(&case_id) {
                total += 1;
                if theme.code_ids.contains(&application.code_id) {
                    covered += 1;
                }
            }
            if total > 0 {
                salience.insert(case_id, covered as f64 / total as f64);
            }
        }
        Ok(salience)
    }

    /// Symmetric co-occurrence counts of code pairs across segments,
    /// sorted most-frequent first.
    pub fn co_occurrence(&self) -> Vec<CoOccurrence> {
        let state = self.session.lock_state();
        let mut counts: BTreeMap<(CodeId, CodeId), usize> = BTreeMap::new();
        for key in state.segments.keys() {
            let codes: Vec<CodeId> = state.applications.codes_for_segment(key).into_iter().collect();
            for i in 0..codes.len() {
                for j in (i + 1)..codes.len() {
                    let pair = (codes[i].clone(), codes[j].clone());
                    *counts.entry(pair).or_insert(0) += 1;
                }
            }
        }
        let mut result: Vec<CoOccurrence> = counts
            .into_iter()
            .map(|((code_a, code_b), count)| CoOccurrence {
                code_a,
                code_b,
                count,
            })
            .collect();
        result.sort_by(|a, b| b.count.cmp(&a.count));
        result
    }
}

/// Aggregate per-code frequency and example excerpts, optionally restricted
/// to a case subset. Codes without applications are excluded.
fn aggregate_code_usage(state: &SessionState, case_filter: Option<&[String]>) -> Vec<CodeUsage> {
    let in_scope = |case_id: &str| match case_filter {
        Some(cases) => cases.iter().any(|c| c == case_id),
        None => true,
    };

    let mut usage = Vec::new();
    for code in state.codes.iter() {
        let mut frequency = 0usize;
        let mut excerpts = Vec::new();
        for application in state.applications.for_code(&code.id) {
            if !in_scope(&application.segment.case_id) {
                continue;
            }
            frequency += 1;
            if excerpts.len() < MAX_EXCERPTS_PER_CODE {
                if let Some(segment) = state.segments.get(&application.segment) {
                    excerpts.push(truncate_excerpt(&segment.text));
                }
            }
        }
        if frequency > 0 {
            usage.push(CodeUsage {
                code_id: code.id.clone(),
                label: code.label.clone(),
                frequency,
                excerpts,
            });
        }
    }
    usage.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.label.cmp(&b.label)));
    usage
}

fn truncate_excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_MAX_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(EXCERPT_MAX_CHARS).collect();
    format!("{}…", truncated)
}
