//! Reliability Engine
//!
//! Computes agreement between two or more independent coding passes over the
//! session's segment universe. The unit of agreement is segment-level set
//! equality of applied code ids; the chance-corrected coefficient is a
//! Cohen-style kappa with expected agreement taken from each rater's
//! marginal set-label frequencies. Disagreements are reported for human
//! review, never auto-resolved.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;

use qualinsight_core::prompt::{disagreement_prompt, AnalysisMode};
use qualinsight_core::{
    interpret_kappa, ApplicationSource, CodeId, ConfusionCount, CoreError, Disagreement,
    PairwiseAgreement, RaterSet, ReliabilityReport, SegmentKey,
};

use crate::error::EngineResult;
use crate::session::Session;

/// The reliability engine. Cheap to construct; reports are stored in the
/// session by name.
pub struct ReliabilityEngine {
    session: Arc<Session>,
}

impl ReliabilityEngine {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Compare two or more rating sets over the session's segments.
    ///
    /// Fails with insufficient data when fewer than two raters are given,
    /// any rater set is empty, or no segments are loaded. The finished
    /// report is stored under `name`; recomputation under the same name
    /// replaces the old report with a fresh one.
    pub fn compare(&self, name: &str, raters: &[RaterSet]) -> EngineResult<ReliabilityReport> {
        if raters.len() < 2 {
            return Err(CoreError::insufficient_data(format!(
                "reliability needs at least two raters, got {}",
                raters.len()
            ))
            .into());
        }
        for rater in raters {
            if rater.applications.is_empty() {
                return Err(CoreError::insufficient_data(format!(
                    "rater {} has no code applications",
                    rater.rater
                ))
                .into());
            }
        }

        let mut state = self.session.lock_state();
        let universe: Vec<SegmentKey> = state.segments.keys().cloned().collect();
        if universe.is_empty() {
            return Err(
                CoreError::insufficient_data("session has no segments to compare over").into(),
            );
        }

        // Per rater: segment -> set of applied code ids.
        let by_rater: Vec<BTreeMap<SegmentKey, BTreeSet<CodeId>>> = raters
            .iter()
            .map(|rater| {
                let mut sets: BTreeMap<SegmentKey, BTreeSet<CodeId>> = BTreeMap::new();
                for application in &rater.applications {
                    sets.entry(application.segment.clone())
                        .or_default()
                        .insert(application.code_id.clone());
                }
                sets
            })
            .collect();

        let mut pairwise = Vec::new();
        for i in 0..raters.len() {
            for j in (i + 1)..raters.len() {
                pairwise.push(pairwise_agreement(
                    &universe,
                    &raters[i].rater,
                    &by_rater[i],
                    &raters[j].rater,
                    &by_rater[j],
                ));
            }
        }

        let observed_agreement =
            pairwise.iter().map(|p| p.observed_agreement).sum::<f64>() / pairwise.len() as f64;
        let kappa = pairwise.iter().map(|p| p.kappa).sum::<f64>() / pairwise.len() as f64;

        let report = ReliabilityReport {
            name: name.to_string(),
            raters: raters.iter().map(|r| r.rater.clone()).collect(),
            segment_count: universe.len(),
            observed_agreement,
            kappa,
            interpretation: interpret_kappa(kappa).to_string(),
            pairwise,
            computed_at: Utc::now(),
        };

        state.reliability.insert(name.to_string(), report.clone());
        tracing::info!(
            name,
            kappa = report.kappa,
            observed = report.observed_agreement,
            "reliability comparison stored"
        );
        Ok(report)
    }

    /// Fetch a stored report by name.
    pub fn get(&self, name: &str) -> Option<ReliabilityReport> {
        self.session.lock_state().reliability.get(name).cloned()
    }

    /// Package the session's own applications as a rating set, optionally
    /// restricted to one source (e.g. the AI pass vs. the human pass).
    pub fn session_rater(
        &self,
        rater: impl Into<String>,
        source: Option<ApplicationSource>,
    ) -> RaterSet {
        let state = self.session.lock_state();
        let applications = state
            .applications
            .iter()
            .filter(|a| source.map_or(true, |s| a.source == s))
            .cloned()
            .collect();
        RaterSet::new(rater, applications)
    }

    /// LLM-written rationale for one disagreement in a stored report, to
    /// support human adjudication. The engine never resolves the
    /// disagreement itself.
    pub async fn explain_disagreement(
        &self,
        report_name: &str,
        segment: &SegmentKey,
    ) -> EngineResult<String> {
        let (text, labels_a, labels_b) = {
            let state = self.session.lock_state();
            let report = state
                .reliability
                .get(report_name)
                .ok_or_else(|| CoreError::not_found(format!("reliability report {}", report_name)))?;
            let disagreement = report
                .pairwise
                .iter()
                .flat_map(|p| p.disagreements.iter())
                .find(|d| &d.segment == segment)
                .ok_or_else(|| {
                    CoreError::not_found(format!(
                        "no disagreement on segment {} in report {}",
                        segment, report_name
                    ))
                })?;
            let text = state
                .segments
                .get(segment)
                .ok_or_else(|| CoreError::not_found(format!("segment {}", segment)))?
                .text
                .clone();

            // Deleted codes fall back to their raw id.
            let labels = |set: &BTreeSet<CodeId>| -> Vec<String> {
                set.iter()
                    .map(|id| {
                        state
                            .codes
                            .get(id)
                            .map(|c| c.label.clone())
                            .unwrap_or_else(|| id.to_string())
                    })
                    .collect()
            };
            (text, labels(&disagreement.set_a), labels(&disagreement.set_b))
        };

        let prompt = disagreement_prompt(&text, &labels_a, &labels_b);
        let completion = self
            .session
            .complete(
                AnalysisMode::ReliabilityRationale,
                &prompt,
                "explain_disagreement",
                &segment.to_string(),
            )
            .await?;
        Ok(completion.content.trim().to_string())
    }
}

/// Agreement statistics for one rater pair over the segment universe.
fn pairwise_agreement(
    universe: &[SegmentKey],
    rater_a: &str,
    sets_a: &BTreeMap<SegmentKey, BTreeSet<CodeId>>,
    rater_b: &str,
    sets_b: &BTreeMap<SegmentKey, BTreeSet<CodeId>>,
) -> PairwiseAgreement {
    let empty = BTreeSet::new();
    let mut matches = 0usize;
    let mut disagreements = Vec::new();
    let mut confusion: BTreeMap<(CodeId, CodeId), u32> = BTreeMap::new();
    let mut label_counts_a: BTreeMap<Vec<CodeId>, usize> = BTreeMap::new();
    let mut label_counts_b: BTreeMap<Vec<CodeId>, usize> = BTreeMap::new();

    for segment in universe {
        let set_a = sets_a.get(segment).unwrap_or(&empty);
        let set_b = sets_b.get(segment).unwrap_or(&empty);

        if set_a == set_b {
            matches += 1;
        } else {
            disagreements.push(Disagreement {
                segment: segment.clone(),
                set_a: set_a.clone(),
                set_b: set_b.clone(),
            });
        }

        for code_a in set_a {
            for code_b in set_b {
                *confusion
                    .entry((code_a.clone(), code_b.clone()))
                    .or_insert(0) += 1;
            }
        }

        // The applied set, canonicalized, is the categorical label a
        // rater assigned to this segment.
        let label_a: Vec<CodeId> = set_a.iter().cloned().collect();
        let label_b: Vec<CodeId> = set_b.iter().cloned().collect();
        *label_counts_a.entry(label_a).or_insert(0) += 1;
        *label_counts_b.entry(label_b).or_insert(0) += 1;
    }

    let n = universe.len() as f64;
    let observed = matches as f64 / n;

    // Expected agreement from each rater's marginal label frequencies.
    let mut expected = 0.0;
    for (label, count_a) in &label_counts_a {
        if let Some(count_b) = label_counts_b.get(label) {
            expected += (*count_a as f64 / n) * (*count_b as f64 / n);
        }
    }

    let kappa = if expected >= 1.0 {
        1.0
    } else {
        (observed - expected) / (1.0 - expected)
    };

    PairwiseAgreement {
        rater_a: rater_a.to_string(),
        rater_b: rater_b.to_string(),
        observed_agreement: observed,
        expected_agreement: expected,
        kappa,
        disagreements,
        confusion: confusion
            .into_iter()
            .map(|((code_a, code_b), count)| ConfusionCount {
                code_a,
                code_b,
                count,
            })
            .collect(),
    }
}
