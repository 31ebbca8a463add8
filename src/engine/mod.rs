//! Analysis Engines
//!
//! The four engines driving a session: coding (deductive/inductive over the
//! code forest), theme aggregation, inter-rater reliability, and per-segment
//! insight analysis. Every engine is constructed over the shared session
//! context and holds no state of its own.

pub mod coding;
pub mod insight;
pub mod reliability;
pub mod theme;

pub use coding::{BatchOutcome, BatchResult, CodeUsageCount, CodingEngine, CodingMode, CodingStats};
pub use insight::InsightEngine;
pub use reliability::ReliabilityEngine;
pub use theme::{CoOccurrence, ThemeEngine};
