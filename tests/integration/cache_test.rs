//! Request cache behavior: single-flight collapsing, failure non-memoization,
//! and interaction with the retry policy.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use qualinsight::core::SegmentKey;
use qualinsight::llm::{ProviderError, RequestCache};
use qualinsight::{CodingEngine, CodingMode, EngineError};

use crate::support::{coding_response, completion, sample_segments, session_with, MockProvider};

#[tokio::test]
async fn test_concurrent_get_or_compute_invokes_once() {
    let cache = Arc::new(RequestCache::new());
    let invocations = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let invocations = Arc::clone(&invocations);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute("shared-fingerprint", || async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(completion("the one result"))
                })
                .await
                .unwrap()
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    // Exactly one underlying invocation, identical results for all callers.
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| r.content == "the one result"));
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_concurrent_proposals_share_one_provider_call() {
    let provider = Arc::new(
        MockProvider::new()
            .with_delay(Duration::from_millis(40))
            .with_default_response(coding_response(&["Concern"])),
    );
    let session = session_with(Arc::clone(&provider));
    session.load_segments(sample_segments()).unwrap();
    let key = SegmentKey::new("case-1", "s1");

    let first = {
        let session = Arc::clone(&session);
        let key = key.clone();
        tokio::spawn(async move {
            CodingEngine::new(session)
                .propose_codes(&key, CodingMode::Inductive)
                .await
                .unwrap()
        })
    };
    let second = {
        let session = Arc::clone(&session);
        let key = key.clone();
        tokio::spawn(async move {
            CodingEngine::new(session)
                .propose_codes(&key, CodingMode::Inductive)
                .await
                .unwrap()
        })
    };

    let (a, b) = (first.await.unwrap(), second.await.unwrap());
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].label, b[0].label);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_exhausted_timeouts_surface_and_leave_no_entry() {
    let provider = Arc::new(
        MockProvider::new()
            .push_err(ProviderError::Timeout { timeout_ms: 100 })
            .push_err(ProviderError::Timeout { timeout_ms: 100 })
            .push_err(ProviderError::Timeout { timeout_ms: 100 }),
    );
    let session = session_with(Arc::clone(&provider));
    session.load_segments(sample_segments()).unwrap();
    let engine = CodingEngine::new(Arc::clone(&session));

    let err = engine
        .propose_codes(&SegmentKey::new("case-1", "s1"), CodingMode::Inductive)
        .await
        .unwrap_err();

    match err {
        EngineError::Provider {
            operation,
            context,
            source,
        } => {
            assert_eq!(operation, "propose_codes");
            assert_eq!(context, "case-1/s1");
            assert!(matches!(source, ProviderError::Timeout { .. }));
        }
        other => panic!("expected provider error, got {:?}", other),
    }

    // Three attempts (max retries), no cache entry for the failure.
    assert_eq!(provider.calls(), 3);
    assert_eq!(session.cache_stats().entries, 0);
}

#[tokio::test]
async fn test_clear_cache_forces_recompute() {
    let provider = Arc::new(
        MockProvider::new().with_default_response(coding_response(&["Focus"])),
    );
    let session = session_with(Arc::clone(&provider));
    session.load_segments(sample_segments()).unwrap();
    let engine = CodingEngine::new(Arc::clone(&session));
    let key = SegmentKey::new("case-2", "s1");

    engine.propose_codes(&key, CodingMode::Inductive).await.unwrap();
    engine.propose_codes(&key, CodingMode::Inductive).await.unwrap();
    assert_eq!(provider.calls(), 1);
    assert_eq!(session.cache_stats().hits, 1);

    session.clear_cache();
    assert_eq!(session.cache_stats().entries, 0);

    engine.propose_codes(&key, CodingMode::Inductive).await.unwrap();
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_distinct_modes_do_not_share_entries() {
    let provider = Arc::new(
        MockProvider::new().with_default_response(coding_response(&["Focus"])),
    );
    let session = session_with(Arc::clone(&provider));
    session.load_segments(sample_segments()).unwrap();
    let engine = CodingEngine::new(Arc::clone(&session));
    let key = SegmentKey::new("case-2", "s1");

    engine.propose_codes(&key, CodingMode::Inductive).await.unwrap();
    engine.propose_codes(&key, CodingMode::Deductive).await.unwrap();
    assert_eq!(provider.calls(), 2);
    assert_eq!(session.cache_stats().entries, 2);
}
