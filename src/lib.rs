//! QualInsight
//!
//! AI-assisted qualitative analysis engine: turns imported interview and
//! field-note segments into a hierarchical coding scheme, aggregates codes
//! into cross-case themes, and computes inter-rater reliability, driven by
//! interchangeable LLM backends.
//!
//! The workspace splits into three crates:
//! - `qualinsight-core` - data model, error taxonomy, prompt assembly
//! - `qualinsight-llm` - provider adapters, retry policy, request cache
//! - `qualinsight` (this crate) - the session object and the engines
//!
//! A session is created once per working run and passed to every engine;
//! nothing persists beyond it. The presentation layer, file formats, and
//! report rendering are external collaborators consuming the export
//! boundary.

pub mod engine;
pub mod error;
pub mod export;
pub mod session;

pub use engine::{
    BatchOutcome, BatchResult, CoOccurrence, CodeUsageCount, CodingEngine, CodingMode,
    CodingStats, InsightEngine, ReliabilityEngine, ThemeEngine,
};
pub use error::{EngineError, EngineResult};
pub use export::SessionExport;
pub use session::{Session, SessionConfig};

// Re-export the data model and provider surface the engines speak.
pub use qualinsight_core as core;
pub use qualinsight_llm as llm;
