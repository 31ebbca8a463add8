//! Engine Error Types
//!
//! The application-level error type wraps the structural taxonomy from the
//! core crate and the provider taxonomy from the llm crate, attaching enough
//! call-site context (operation, segment, provider) for the user to retry
//! manually.

use thiserror::Error;

use qualinsight_core::CoreError;
use qualinsight_llm::ProviderError;

/// Error type surfaced by the analysis engines.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Structural errors: validation, cycles, parse failures, missing
    /// entities, insufficient data
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A provider call failed after the retry policy was exhausted
    #[error("{operation} failed for {context}: {source}")]
    Provider {
        operation: &'static str,
        context: String,
        #[source]
        source: ProviderError,
    },
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Wrap a provider error with the failing operation and its subject.
    pub fn provider(
        operation: &'static str,
        context: impl Into<String>,
        source: ProviderError,
    ) -> Self {
        Self::Provider {
            operation,
            context: context.into(),
            source,
        }
    }

    /// The underlying provider error, when this is one.
    pub fn as_provider_error(&self) -> Option<&ProviderError> {
        match self {
            EngineError::Provider { source, .. } => Some(source),
            EngineError::Core(_) => None,
        }
    }
}
