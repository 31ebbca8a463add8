//! QualInsight Core
//!
//! Foundational data model, error types, prompt assembly, and session state
//! for the QualInsight workspace. This crate has zero dependencies on
//! application-level code (engines, LLM providers, HTTP).
//!
//! ## Module Organization
//!
//! - `error` - Structural error taxonomy (`CoreError`, `CoreResult`)
//! - `segment` - Immutable text segments and the segment store
//! - `code` - The code forest and its invariants
//! - `application` - The segment-to-code relation
//! - `theme` - The theme forest layered over the code forest
//! - `reliability` - Inter-rater reliability report types
//! - `prompt` - Prompt assembly and per-mode parsing contracts
//! - `session` - The session-scoped mutable state container
//!
//! ## Design Principles
//!
//! 1. **Light dependencies (serde/thiserror/uuid/chrono)** - keeps build times minimal
//! 2. **Forest invariants enforced at the data-structure boundary** - engines cannot corrupt them
//! 3. **Unidirectional dependency** - this crate depends on nothing else in the workspace

pub mod application;
pub mod code;
pub mod error;
pub mod prompt;
pub mod reliability;
pub mod segment;
pub mod session;
pub mod theme;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Segments ───────────────────────────────────────────────────────────
pub use segment::{SegmentKey, SegmentMetadata, SegmentStatus, SegmentStore, TextSegment};

// ── Codes & Applications ───────────────────────────────────────────────
pub use application::{ApplicationSet, ApplicationSource, CodeApplication};
pub use code::{normalize_label, Code, CodeForest, CodeId, CODE_COLORS};

// ── Themes ─────────────────────────────────────────────────────────────
pub use theme::{Theme, ThemeForest, ThemeId};

// ── Reliability ────────────────────────────────────────────────────────
pub use reliability::{
    interpret_kappa, ConfusionCount, Disagreement, PairwiseAgreement, RaterSet, ReliabilityReport,
};

// ── Prompt Assembly ────────────────────────────────────────────────────
pub use prompt::{
    AnalysisMode, CodeSuggestion, CodeUsage, CodebookEntry, DiscourseOutcome, NarrativeOutcome,
    SentimentOutcome, StructuredPrompt, ThemeSuggestion, PROMPT_TEMPLATE_VERSION,
};

// ── Session State ──────────────────────────────────────────────────────
pub use session::SessionState;
