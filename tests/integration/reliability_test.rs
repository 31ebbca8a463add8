//! Reliability engine: agreement statistics between independent coding
//! passes, stored reports, and disagreement review.

use std::sync::Arc;

use qualinsight::core::{
    ApplicationSource, CodeApplication, CoreError, RaterSet, SegmentKey,
};
use qualinsight::{CodingEngine, EngineError, ReliabilityEngine};

use crate::support::{sample_segments, session_with, MockProvider};

fn key(case: &str, seg: &str) -> SegmentKey {
    SegmentKey::new(case, seg)
}

fn application(seg: SegmentKey, code: &str) -> CodeApplication {
    CodeApplication::new(seg, code.into(), ApplicationSource::Human)
}

/// Two segments only, so the spec scenario's arithmetic holds exactly.
fn two_segment_session() -> Arc<qualinsight::Session> {
    let session = session_with(Arc::new(MockProvider::new()));
    session
        .load_segments(vec![
            qualinsight::core::TextSegment::new("case-1", "s1", "segment one text"),
            qualinsight::core::TextSegment::new("case-1", "s2", "segment two text"),
        ])
        .unwrap();
    session
}

#[tokio::test]
async fn test_fewer_than_two_raters_is_insufficient() {
    let session = two_segment_session();
    let engine = ReliabilityEngine::new(session);

    let rater = RaterSet::new("a", vec![application(key("case-1", "s1"), "concern")]);
    let err = engine.compare("solo", &[rater]).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::InsufficientData(_))
    ));
}

#[tokio::test]
async fn test_empty_rater_set_is_insufficient() {
    let session = two_segment_session();
    let engine = ReliabilityEngine::new(session);

    let a = RaterSet::new("a", vec![application(key("case-1", "s1"), "concern")]);
    let b = RaterSet::new("b", vec![]);
    let err = engine.compare("half-empty", &[a, b]).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::InsufficientData(_))
    ));
}

#[tokio::test]
async fn test_identical_raters_reach_kappa_one() {
    let session = two_segment_session();
    let engine = ReliabilityEngine::new(Arc::clone(&session));

    let applications = vec![
        application(key("case-1", "s1"), "concern"),
        application(key("case-1", "s2"), "support"),
    ];
    let a = RaterSet::new("alice", applications.clone());
    let b = RaterSet::new("bob", applications);

    let report = engine.compare("identical", &[a, b]).unwrap();
    assert_eq!(report.observed_agreement, 1.0);
    assert_eq!(report.kappa, 1.0);
    assert_eq!(report.interpretation, "almost perfect");
    assert!(report.pairwise[0].disagreements.is_empty());
}

#[tokio::test]
async fn test_spec_scenario_concern_support() {
    // Deductive vocabulary {"Concern", "Support"}. Rater A applies
    // {Concern} to s1 and nothing to s2; rater B applies {Concern} to s1
    // and {Support} to s2. Exactly 1 of 2 segments matches.
    let session = two_segment_session();
    let engine = ReliabilityEngine::new(Arc::clone(&session));

    let a = RaterSet::new("a", vec![application(key("case-1", "s1"), "Concern")]);
    let b = RaterSet::new(
        "b",
        vec![
            application(key("case-1", "s1"), "Concern"),
            application(key("case-1", "s2"), "Support"),
        ],
    );

    let report = engine.compare("spec-scenario", &[a, b]).unwrap();
    assert_eq!(report.observed_agreement, 0.5);
    assert_eq!(report.segment_count, 2);

    let pair = &report.pairwise[0];
    assert_eq!(pair.disagreements.len(), 1);
    assert_eq!(pair.disagreements[0].segment, key("case-1", "s2"));
    assert!(pair.disagreements[0].set_a.is_empty());
    assert_eq!(pair.disagreements[0].set_b.len(), 1);
}

#[tokio::test]
async fn test_maximal_divergence_is_nonpositive() {
    let session = two_segment_session();
    let engine = ReliabilityEngine::new(session);

    let a = RaterSet::new(
        "a",
        vec![
            application(key("case-1", "s1"), "x"),
            application(key("case-1", "s2"), "y"),
        ],
    );
    let b = RaterSet::new(
        "b",
        vec![
            application(key("case-1", "s1"), "y"),
            application(key("case-1", "s2"), "x"),
        ],
    );

    let report = engine.compare("divergent", &[a, b]).unwrap();
    assert_eq!(report.observed_agreement, 0.0);
    assert!(report.kappa <= 0.0);
    assert_eq!(report.interpretation, "poor (below chance)");
}

#[tokio::test]
async fn test_three_raters_compare_pairwise() {
    let session = two_segment_session();
    let engine = ReliabilityEngine::new(Arc::clone(&session));

    let shared = vec![
        application(key("case-1", "s1"), "concern"),
        application(key("case-1", "s2"), "support"),
    ];
    let a = RaterSet::new("a", shared.clone());
    let b = RaterSet::new("b", shared.clone());
    let c = RaterSet::new(
        "c",
        vec![
            application(key("case-1", "s1"), "concern"),
            application(key("case-1", "s2"), "concern"),
        ],
    );

    let report = engine.compare("triple", &[a, b, c]).unwrap();
    // Pairs: (a,b), (a,c), (b,c).
    assert_eq!(report.pairwise.len(), 3);
    assert_eq!(report.raters, vec!["a", "b", "c"]);
    // (a,b) agree fully, the others on half the segments.
    let mean = (1.0 + 0.5 + 0.5) / 3.0;
    assert!((report.observed_agreement - mean).abs() < 1e-9);
}

#[tokio::test]
async fn test_recompute_replaces_stored_report() {
    let session = two_segment_session();
    let engine = ReliabilityEngine::new(Arc::clone(&session));

    let a = RaterSet::new("a", vec![application(key("case-1", "s1"), "x")]);
    let b = RaterSet::new("b", vec![application(key("case-1", "s1"), "x")]);
    let first = engine.compare("run", &[a, b]).unwrap();

    let a = RaterSet::new(
        "a",
        vec![
            application(key("case-1", "s1"), "x"),
            application(key("case-1", "s2"), "y"),
        ],
    );
    let b = RaterSet::new("b", vec![application(key("case-1", "s1"), "x")]);
    let second = engine.compare("run", &[a, b]).unwrap();

    assert!(first.observed_agreement > second.observed_agreement);
    let stored = engine.get("run").unwrap();
    assert_eq!(stored.observed_agreement, second.observed_agreement);
    assert!(engine.get("never-computed").is_none());
}

#[tokio::test]
async fn test_session_rater_filters_by_source() {
    let session = session_with(Arc::new(MockProvider::new()));
    session.load_segments(sample_segments()).unwrap();
    let coding = CodingEngine::new(Arc::clone(&session));
    let reliability = ReliabilityEngine::new(Arc::clone(&session));

    let code = coding.add_code("Concern", "", None, None).unwrap();
    coding
        .apply_code(&key("case-1", "s1"), &code.id, ApplicationSource::Ai, 0.8, "")
        .unwrap();
    coding
        .apply_code(&key("case-1", "s2"), &code.id, ApplicationSource::Human, 1.0, "")
        .unwrap();

    let ai = reliability.session_rater("ai-pass", Some(ApplicationSource::Ai));
    let human = reliability.session_rater("human-pass", Some(ApplicationSource::Human));
    let all = reliability.session_rater("everything", None);
    assert_eq!(ai.applications.len(), 1);
    assert_eq!(human.applications.len(), 1);
    assert_eq!(all.applications.len(), 2);
}

#[tokio::test]
async fn test_explain_disagreement_uses_code_labels() {
    let provider = Arc::new(MockProvider::new());
    let session = session_with(Arc::clone(&provider));
    session
        .load_segments(vec![qualinsight::core::TextSegment::new(
            "case-1",
            "s1",
            "I was afraid of losing my job.",
        )])
        .unwrap();
    let coding = CodingEngine::new(Arc::clone(&session));
    let engine = ReliabilityEngine::new(Arc::clone(&session));

    let concern = coding.add_code("Concern", "worry", None, None).unwrap();
    let a = RaterSet::new(
        "a",
        vec![CodeApplication::new(
            key("case-1", "s1"),
            concern.id.clone(),
            ApplicationSource::Human,
        )],
    );
    let b = RaterSet::new(
        "b",
        vec![application(key("case-1", "s1"), "other-code")],
    );
    engine.compare("review", &[a, b]).unwrap();

    provider.enqueue_ok("Coder A read worry; coder B read something else entirely.");
    let rationale = engine
        .explain_disagreement("review", &key("case-1", "s1"))
        .await
        .unwrap();
    assert!(rationale.contains("worry"));

    let err = engine
        .explain_disagreement("review", &key("case-1", "s9"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::NotFound(_))));

    let err = engine
        .explain_disagreement("no-report", &key("case-1", "s1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::NotFound(_))));
}
