//! Export / Import Boundary
//!
//! The core hands its state to an external export/report collaborator as
//! plain serializable structures with stable field names; file formats are
//! that collaborator's business. The same shape imports back into a session,
//! reproducing a structurally identical code forest, theme forest, and
//! application set.

use serde::{Deserialize, Serialize};

use qualinsight_core::{
    ApplicationSet, Code, CodeApplication, CodeForest, CoreError, ReliabilityReport,
    SegmentStatus, Theme, ThemeForest,
};

use crate::error::EngineResult;
use crate::session::Session;

/// Serializable snapshot of a session's analysis state.
///
/// Codes and themes are emitted parents-before-children so a consumer (or a
/// re-import) can rebuild each forest in one forward pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionExport {
    pub codes: Vec<Code>,
    pub themes: Vec<Theme>,
    pub applications: Vec<CodeApplication>,
    pub reliability: Vec<ReliabilityReport>,
}

/// Order a code forest parents-first.
fn codes_in_forest_order(forest: &CodeForest) -> Vec<Code> {
    let mut ordered = Vec::with_capacity(forest.len());
    let mut queue: Vec<Code> = forest.roots().into_iter().cloned().collect();
    while let Some(code) = queue.pop() {
        queue.extend(forest.children(&code.id).into_iter().cloned());
        ordered.push(code);
    }
    ordered
}

/// Order a theme forest parents-first.
fn themes_in_forest_order(forest: &ThemeForest) -> Vec<Theme> {
    let mut ordered = Vec::with_capacity(forest.len());
    let mut queue: Vec<Theme> = forest.roots().into_iter().cloned().collect();
    while let Some(theme) = queue.pop() {
        queue.extend(forest.children(&theme.id).into_iter().cloned());
        ordered.push(theme);
    }
    ordered
}

/// Rebuild a code forest from exported nodes, tolerating arbitrary input
/// order. Fails when a parent id never materializes.
fn rebuild_code_forest(mut pending: Vec<Code>) -> EngineResult<CodeForest> {
    let mut forest = CodeForest::new();
    while !pending.is_empty() {
        let before = pending.len();
        let mut deferred = Vec::new();
        for code in pending {
            match &code.parent_id {
                Some(parent) if !forest.contains(parent) => deferred.push(code),
                _ => forest.insert(code)?,
            }
        }
        if deferred.len() == before {
            return Err(CoreError::validation(format!(
                "import contains {} code(s) whose parent never appears",
                deferred.len()
            ))
            .into());
        }
        pending = deferred;
    }
    Ok(forest)
}

/// Rebuild a theme forest against an already-rebuilt code forest.
fn rebuild_theme_forest(mut pending: Vec<Theme>, codes: &CodeForest) -> EngineResult<ThemeForest> {
    let mut forest = ThemeForest::new();
    while !pending.is_empty() {
        let before = pending.len();
        let mut deferred = Vec::new();
        for theme in pending {
            match &theme.parent_id {
                Some(parent) if !forest.contains(parent) => deferred.push(theme),
                _ => forest.insert(theme, codes)?,
            }
        }
        if deferred.len() == before {
            return Err(CoreError::validation(format!(
                "import contains {} theme(s) whose parent never appears",
                deferred.len()
            ))
            .into());
        }
        pending = deferred;
    }
    Ok(forest)
}

impl Session {
    /// Snapshot the session's analysis state for the export collaborator.
    pub fn export(&self) -> SessionExport {
        let state = self.lock_state();
        SessionExport {
            codes: codes_in_forest_order(&state.codes),
            themes: themes_in_forest_order(&state.themes),
            applications: state.applications.iter().cloned().collect(),
            reliability: state.reliability.values().cloned().collect(),
        }
    }

    /// Replace this session's codebook with an exported snapshot.
    ///
    /// Applications must reference imported codes and already-loaded
    /// segments. On any failure the session state is left unchanged.
    pub fn import_codebook(&self, export: SessionExport) -> EngineResult<()> {
        let mut state = self.lock_state();

        let codes = rebuild_code_forest(export.codes)?;
        let themes = rebuild_theme_forest(export.themes, &codes)?;

        let mut applications = ApplicationSet::new();
        for application in export.applications {
            if !codes.contains(&application.code_id) {
                return Err(CoreError::validation(format!(
                    "application references unknown code {}",
                    application.code_id
                ))
                .into());
            }
            if !state.segments.contains(&application.segment) {
                return Err(CoreError::validation(format!(
                    "application references unknown segment {}",
                    application.segment
                ))
                .into());
            }
            applications.upsert(application);
        }

        // All validated; swap in the imported state.
        let coded_segments: Vec<_> = applications.iter().map(|a| a.segment.clone()).collect();
        state.codes = codes;
        state.themes = themes;
        state.applications = applications;
        for report in export.reliability {
            state.reliability.insert(report.name.clone(), report);
        }
        for key in coded_segments {
            if state.segment_status(&key) == SegmentStatus::Unanalyzed {
                state.set_segment_status(&key, SegmentStatus::Proposed);
            }
        }
        tracing::info!(session = %self.id(), "codebook imported");
        Ok(())
    }
}
