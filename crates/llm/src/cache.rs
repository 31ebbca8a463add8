//! Request Cache
//!
//! Content-addressed memoization of provider calls, scoped to one session.
//!
//! Guarantees:
//! - At most one in-flight computation per fingerprint: concurrent callers
//!   for the same fingerprint wait on the first result instead of issuing
//!   duplicate provider calls.
//! - Failures are never stored; the next caller recomputes from scratch.
//! - No TTL and no eviction inside a session; `clear` is the only removal.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use qualinsight_core::prompt::{StructuredPrompt, PROMPT_TEMPLATE_VERSION};

use super::types::{Completion, LlmResult};

/// Deterministic cache key over everything that shapes a provider response:
/// provider, model, template identity and version, and the normalized prompt
/// payload.
pub fn fingerprint(
    provider: &str,
    model: &str,
    template_id: &str,
    prompt: &StructuredPrompt,
) -> String {
    let payload = serde_json::to_vec(prompt).expect("prompt payload serializes");
    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update([0]);
    hasher.update(model.as_bytes());
    hasher.update([0]);
    hasher.update(template_id.as_bytes());
    hasher.update([0]);
    hasher.update(PROMPT_TEMPLATE_VERSION.as_bytes());
    hasher.update([0]);
    hasher.update(&payload);
    format!("{:x}", hasher.finalize())
}

/// One fingerprint's slot: the memoized result plus bookkeeping.
struct CacheSlot {
    cell: OnceCell<Completion>,
    created_at: DateTime<Utc>,
    hits: AtomicU64,
}

impl CacheSlot {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            created_at: Utc::now(),
            hits: AtomicU64::new(0),
        }
    }
}

/// A cached entry's metadata, for inspection and export.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub hits: u64,
}

/// Aggregate cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Session-scoped request cache with a single-flight guarantee per
/// fingerprint.
#[derive(Default)]
pub struct RequestCache {
    entries: DashMap<String, Arc<CacheSlot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for `fingerprint`, or run `compute` to
    /// produce it.
    ///
    /// Concurrent callers sharing a fingerprint collapse into one provider
    /// call: the first runs `compute`, the rest wait and receive the same
    /// completion. When `compute` fails, nothing is stored and the error
    /// goes to the caller that ran it; waiting callers retry from scratch.
    pub async fn get_or_compute<F, Fut>(&self, fingerprint: &str, compute: F) -> LlmResult<Completion>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LlmResult<Completion>>,
    {
        let slot = self
            .entries
            .entry(fingerprint.to_string())
            .or_insert_with(|| Arc::new(CacheSlot::new()))
            .value()
            .clone();

        let computed = AtomicBool::new(false);
        let value = slot
            .cell
            .get_or_try_init(|| {
                computed.store(true, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(fingerprint, "cache miss, invoking provider");
                compute()
            })
            .await?;

        if !computed.load(Ordering::Relaxed) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            slot.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(fingerprint, "cache hit");
        }

        Ok(value.clone())
    }

    /// Number of completed (stored) entries.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Counters survive so a session's totals remain
    /// meaningful after an explicit clear.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Metadata for every stored entry.
    pub fn entries(&self) -> Vec<CacheEntryInfo> {
        self.entries
            .iter()
            .filter(|entry| entry.value().cell.initialized())
            .map(|entry| CacheEntryInfo {
                fingerprint: entry.key().clone(),
                created_at: entry.value().created_at,
                hits: entry.value().hits.load(Ordering::Relaxed),
            })
            .collect()
    }
}
