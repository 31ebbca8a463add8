//! Core Error Types
//!
//! Defines the structural error taxonomy shared across the QualInsight
//! workspace. These error types are dependency-free (only thiserror + serde)
//! to keep the core crate lightweight.
//!
//! Provider-side errors (auth, rate limits, timeouts) live in the llm crate;
//! the application crate wraps both taxonomies with call-site context.

use thiserror::Error;

/// Structural error type for the QualInsight workspace.
///
/// These errors indicate a caller or data problem, never a transient
/// condition, so they are surfaced immediately and never retried.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Data or rule violations (duplicate segment keys, missing parents,
    /// deletion with children, invalid state transitions)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Forest operations that would introduce a cycle
    #[error("Cycle error: {0}")]
    Cycle(String),

    /// LLM output that does not conform to the expected response contract
    #[error("Parse error: {0}")]
    Parse(String),

    /// Lookup of an entity that does not exist in the session
    #[error("Not found: {0}")]
    NotFound(String),

    /// Reliability computation attempted without enough ratings
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// JSON serialization/deserialization errors on internal structures
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a cycle error
    pub fn cycle(msg: impl Into<String>) -> Self {
        Self::Cycle(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an insufficient data error
    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
