//! Reliability Report Types
//!
//! Value types produced by the reliability engine when comparing independent
//! coding passes. Reports are immutable once computed; recomputation creates
//! a new report.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::CodeApplication;
use crate::code::CodeId;
use crate::segment::SegmentKey;

/// One rater's complete set of code applications over the segment universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaterSet {
    pub rater: String,
    pub applications: Vec<CodeApplication>,
}

impl RaterSet {
    pub fn new(rater: impl Into<String>, applications: Vec<CodeApplication>) -> Self {
        Self {
            rater: rater.into(),
            applications,
        }
    }
}

/// A segment where two raters applied different code sets. Left for human
/// review; never auto-resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disagreement {
    pub segment: SegmentKey,
    pub set_a: BTreeSet<CodeId>,
    pub set_b: BTreeSet<CodeId>,
}

/// Diagnostic count of how often `code_a` (rater A) co-occurred with
/// `code_b` (rater B) on the same segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionCount {
    pub code_a: CodeId,
    pub code_b: CodeId,
    pub count: u32,
}

/// Agreement statistics for one rater pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseAgreement {
    pub rater_a: String,
    pub rater_b: String,
    pub observed_agreement: f64,
    pub expected_agreement: f64,
    pub kappa: f64,
    pub disagreements: Vec<Disagreement>,
    pub confusion: Vec<ConfusionCount>,
}

/// Immutable result of one reliability comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityReport {
    pub name: String,
    pub raters: Vec<String>,
    pub segment_count: usize,
    /// Mean over all rater pairs (the single pair's value for two raters).
    pub observed_agreement: f64,
    /// Chance-corrected coefficient, mean over all rater pairs.
    pub kappa: f64,
    pub interpretation: String,
    pub pairwise: Vec<PairwiseAgreement>,
    pub computed_at: DateTime<Utc>,
}

/// Qualitative band for a kappa coefficient.
pub fn interpret_kappa(kappa: f64) -> &'static str {
    if kappa < 0.0 {
        "poor (below chance)"
    } else if kappa < 0.2 {
        "slight"
    } else if kappa < 0.4 {
        "fair"
    } else if kappa < 0.6 {
        "moderate"
    } else if kappa < 0.8 {
        "substantial"
    } else {
        "almost perfect"
    }
}
