//! Session boundary: import validation, export round-trip, provider
//! fail-fast, and serialization stability of the export shape.

use std::sync::Arc;

use qualinsight::core::{ApplicationSource, CoreError, SegmentKey, TextSegment};
use qualinsight::llm::{ProviderConfig, ProviderError, ProviderKind};
use qualinsight::{
    CodingEngine, EngineError, Session, SessionConfig, SessionExport, ThemeEngine,
};

use crate::support::{sample_segments, session_with, MockProvider};

fn key(case: &str, seg: &str) -> SegmentKey {
    SegmentKey::new(case, seg)
}

#[test]
fn test_cloud_provider_without_key_fails_before_any_request() {
    for kind in [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::DeepSeek,
    ] {
        let config = SessionConfig {
            provider: ProviderConfig::for_kind(kind),
            ..SessionConfig::default()
        };
        let err = Session::new(config).unwrap_err();
        match err {
            EngineError::Provider { source, .. } => {
                assert!(matches!(source, ProviderError::Auth { .. }));
            }
            other => panic!("expected fail-fast auth error, got {:?}", other),
        }
    }
}

#[test]
fn test_duplicate_segment_import_rejected() {
    let session = session_with(Arc::new(MockProvider::new()));
    session.load_segments(sample_segments()).unwrap();

    let err = session
        .load_segments(vec![TextSegment::new("case-1", "s1", "duplicate")])
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));

    // Incremental import of genuinely new segments still works.
    session
        .load_segments(vec![TextSegment::new("case-5", "s1", "new case")])
        .unwrap();
    assert_eq!(session.segments().len(), 5);
}

#[tokio::test]
async fn test_export_import_roundtrip_preserves_structure() {
    let session = session_with(Arc::new(MockProvider::new()));
    session.load_segments(sample_segments()).unwrap();
    let coding = CodingEngine::new(Arc::clone(&session));
    let themes = ThemeEngine::new(Arc::clone(&session));

    let parent = coding.add_code("Wellbeing", "umbrella", None, None).unwrap();
    let child_a = coding
        .add_code("Concern", "worry", Some(&parent.id), None)
        .unwrap();
    let child_b = coding
        .add_code("Support", "help received", Some(&parent.id), None)
        .unwrap();
    let grandchild = coding
        .add_code("Peer support", "from colleagues", Some(&child_b.id), None)
        .unwrap();
    coding
        .apply_code(&key("case-1", "s1"), &child_a.id, ApplicationSource::Ai, 0.8, "r1")
        .unwrap();
    coding
        .apply_code(&key("case-2", "s2"), &grandchild.id, ApplicationSource::Human, 1.0, "r2")
        .unwrap();
    themes
        .add_theme("Coping", "how people cope", None, [child_a.id.clone(), child_b.id.clone()])
        .unwrap();

    let exported = session.export();
    assert_eq!(exported.codes.len(), 4);
    assert_eq!(exported.themes.len(), 1);
    assert_eq!(exported.applications.len(), 2);

    // Fresh session over the same segment universe.
    let restored = session_with(Arc::new(MockProvider::new()));
    restored.load_segments(sample_segments()).unwrap();
    restored.import_codebook(exported.clone()).unwrap();

    let reexported = restored.export();
    assert_eq!(reexported.codes.len(), exported.codes.len());
    assert_eq!(reexported.applications.len(), exported.applications.len());
    assert_eq!(reexported.themes.len(), exported.themes.len());

    // Structure survives: same parent/child relationships by id.
    let state = restored.lock_state();
    assert_eq!(
        state.codes.get(&child_a.id).unwrap().parent_id,
        Some(parent.id.clone())
    );
    assert_eq!(
        state.codes.get(&grandchild.id).unwrap().parent_id,
        Some(child_b.id.clone())
    );
    assert!(state.codes.get(&parent.id).unwrap().parent_id.is_none());
    assert!(state
        .applications
        .get(&key("case-1", "s1"), &child_a.id)
        .is_some());
    assert!(state
        .applications
        .get(&key("case-2", "s2"), &grandchild.id)
        .is_some());
}

#[tokio::test]
async fn test_import_survives_shuffled_order() {
    let session = session_with(Arc::new(MockProvider::new()));
    session.load_segments(sample_segments()).unwrap();
    let coding = CodingEngine::new(Arc::clone(&session));

    let parent = coding.add_code("Parent", "", None, None).unwrap();
    let child = coding.add_code("Child", "", Some(&parent.id), None).unwrap();
    let _ = child;

    let mut exported = session.export();
    // Children before parents must still import.
    exported.codes.reverse();

    let restored = session_with(Arc::new(MockProvider::new()));
    restored.load_segments(sample_segments()).unwrap();
    restored.import_codebook(exported).unwrap();
    assert_eq!(restored.lock_state().codes.len(), 2);
}

#[test]
fn test_import_rejects_orphans_and_unknown_references() {
    let session = session_with(Arc::new(MockProvider::new()));
    session.load_segments(sample_segments()).unwrap();

    // A child whose parent never appears.
    let mut orphan = qualinsight::core::Code::new("Orphan", "");
    orphan.parent_id = Some("never-exported".into());
    let export = SessionExport {
        codes: vec![orphan],
        ..SessionExport::default()
    };
    let err = session.import_codebook(export).unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));

    // An application referencing a segment outside the universe.
    let code = qualinsight::core::Code::new("Real", "");
    let application = qualinsight::core::CodeApplication::new(
        key("case-9", "s9"),
        code.id.clone(),
        ApplicationSource::Ai,
    );
    let export = SessionExport {
        codes: vec![code],
        applications: vec![application],
        ..SessionExport::default()
    };
    let err = session.import_codebook(export).unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));
}

#[test]
fn test_export_serializes_with_stable_field_names() {
    let session = session_with(Arc::new(MockProvider::new()));
    session.load_segments(sample_segments()).unwrap();
    let coding = CodingEngine::new(Arc::clone(&session));
    let code = coding.add_code("Concern", "worry", None, None).unwrap();
    coding
        .apply_code(&key("case-1", "s1"), &code.id, ApplicationSource::Ai, 0.8, "why")
        .unwrap();

    let json = serde_json::to_value(session.export()).unwrap();
    assert!(json["codes"][0]["label"].is_string());
    assert!(json["codes"][0]["definition"].is_string());
    assert!(json["codes"][0]["color"].is_string());
    let application = &json["applications"][0];
    assert_eq!(application["segment"]["case_id"], "case-1");
    assert_eq!(application["segment"]["segment_id"], "s1");
    assert_eq!(application["source"], "ai");
    assert_eq!(application["confidence"], 0.8);

    // And the shape deserializes back.
    let parsed: SessionExport = serde_json::from_value(json).unwrap();
    assert_eq!(parsed.codes.len(), 1);
    assert_eq!(parsed.applications.len(), 1);
}

#[test]
fn test_segment_status_defaults_for_unknown_key() {
    let session = session_with(Arc::new(MockProvider::new()));
    assert_eq!(
        session.segment_status(&key("nope", "nope")),
        qualinsight::core::SegmentStatus::Unanalyzed
    );
}
