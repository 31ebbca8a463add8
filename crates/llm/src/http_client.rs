//! HTTP Client Factory
//!
//! Provides a factory function for building reqwest clients with the
//! per-provider request timeout applied.

use std::time::Duration;

/// Build a `reqwest::Client` enforcing the configured per-call timeout.
///
/// The timeout covers the whole round trip; an elapsed timer surfaces as
/// `ProviderError::Timeout` through `map_request_error`.
pub fn build_http_client(timeout_ms: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .expect("failed to build reqwest client")
}
