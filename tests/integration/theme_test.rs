//! Theme engine: AI proposals over aggregated usage, member validation,
//! cross-case salience, and co-occurrence views.

use std::sync::Arc;

use qualinsight::core::{ApplicationSource, CodeId, CoreError, SegmentKey};
use qualinsight::{CodingEngine, EngineError, ThemeEngine};

use crate::support::{sample_segments, session_with, MockProvider};

fn key(case: &str, seg: &str) -> SegmentKey {
    SegmentKey::new(case, seg)
}

#[tokio::test]
async fn test_propose_themes_drops_unknown_member_ids() {
    let provider = Arc::new(MockProvider::new());
    let session = session_with(Arc::clone(&provider));
    session.load_segments(sample_segments()).unwrap();
    let coding = CodingEngine::new(Arc::clone(&session));
    let themes = ThemeEngine::new(Arc::clone(&session));

    let concern = coding.add_code("Concern", "", None, None).unwrap();
    coding
        .apply_code(&key("case-1", "s1"), &concern.id, ApplicationSource::Ai, 0.9, "")
        .unwrap();

    // The model references one real member and one invented id.
    provider.enqueue_ok(format!(
        r#"{{"themes": [{{"label": "Wellbeing", "definition": "d",
            "code_ids": ["{}", "made-up-id"]}}]}}"#,
        concern.id
    ));

    let created = themes.propose_themes(None).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].label, "Wellbeing");
    // The invented id was dropped, the real member kept.
    assert!(created[0].code_ids.contains(&concern.id));
    assert_eq!(created[0].code_ids.len(), 1);

    let state = session.lock_state();
    assert_eq!(state.themes.len(), 1);
}

#[tokio::test]
async fn test_propose_themes_without_applications_fails() {
    let provider = Arc::new(MockProvider::new());
    let session = session_with(provider);
    session.load_segments(sample_segments()).unwrap();
    let themes = ThemeEngine::new(session);

    let err = themes.propose_themes(None).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::InsufficientData(_))
    ));
}

#[tokio::test]
async fn test_propose_themes_respects_case_filter() {
    let provider = Arc::new(MockProvider::new());
    let session = session_with(Arc::clone(&provider));
    session.load_segments(sample_segments()).unwrap();
    let coding = CodingEngine::new(Arc::clone(&session));

    let code = coding.add_code("Concern", "", None, None).unwrap();
    // Applications only in case-1.
    coding
        .apply_code(&key("case-1", "s1"), &code.id, ApplicationSource::Ai, 0.9, "")
        .unwrap();

    // Filtering to case-2 leaves nothing to aggregate.
    let themes = ThemeEngine::new(Arc::clone(&session));
    let err = themes
        .propose_themes(Some(&["case-2".to_string()]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::InsufficientData(_))
    ));
}

#[tokio::test]
async fn test_manual_theme_management() {
    let provider = Arc::new(MockProvider::new());
    let session = session_with(provider);
    session.load_segments(sample_segments()).unwrap();
    let coding = CodingEngine::new(Arc::clone(&session));
    let themes = ThemeEngine::new(Arc::clone(&session));

    let code = coding.add_code("Concern", "", None, None).unwrap();
    let theme = themes
        .add_theme("Wellbeing", "overall state", None, [code.id.clone()])
        .unwrap();

    // Unknown member codes are rejected on manual paths.
    let err = themes
        .add_theme("Ghost", "", None, [CodeId::from("missing")])
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));

    let err = themes
        .add_code_to_theme(&theme.id, &CodeId::from("missing"))
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));

    themes.remove_code_from_theme(&theme.id, &code.id).unwrap();
    {
        let state = session.lock_state();
        assert!(state.themes.get(&theme.id).unwrap().code_ids.is_empty());
    }

    // Theme forest cycle protection mirrors the code forest's.
    let sub = themes
        .add_theme("Sub", "", Some(&theme.id), [])
        .unwrap();
    let err = themes.reparent_theme(&theme.id, Some(&sub.id)).unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::Cycle(_))));

    let err = themes.delete_theme(&theme.id, false).unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));
    themes.delete_theme(&theme.id, true).unwrap();
    assert!(session.lock_state().themes.is_empty());
}

#[tokio::test]
async fn test_case_salience() {
    let provider = Arc::new(MockProvider::new());
    let session = session_with(provider);
    session.load_segments(sample_segments()).unwrap();
    let coding = CodingEngine::new(Arc::clone(&session));
    let themes = ThemeEngine::new(Arc::clone(&session));

    let concern = coding.add_code("Concern", "", None, None).unwrap();
    let other = coding.add_code("Other", "", None, None).unwrap();

    // case-1: two applications, one covered by the theme.
    coding
        .apply_code(&key("case-1", "s1"), &concern.id, ApplicationSource::Ai, 0.9, "")
        .unwrap();
    coding
        .apply_code(&key("case-1", "s2"), &other.id, ApplicationSource::Ai, 0.9, "")
        .unwrap();
    // case-2: one application, covered.
    coding
        .apply_code(&key("case-2", "s1"), &concern.id, ApplicationSource::Ai, 0.9, "")
        .unwrap();

    let theme = themes
        .add_theme("Wellbeing", "", None, [concern.id.clone()])
        .unwrap();

    let salience = themes.case_salience(&theme.id).unwrap();
    assert_eq!(salience["case-1"], 0.5);
    assert_eq!(salience["case-2"], 1.0);

    let err = themes.case_salience(&"no-theme".into()).unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_co_occurrence_counts_pairs() {
    let provider = Arc::new(MockProvider::new());
    let session = session_with(provider);
    session.load_segments(sample_segments()).unwrap();
    let coding = CodingEngine::new(Arc::clone(&session));
    let themes = ThemeEngine::new(Arc::clone(&session));

    let a = coding.add_code("A", "", None, None).unwrap();
    let b = coding.add_code("B", "", None, None).unwrap();
    let c = coding.add_code("C", "", None, None).unwrap();

    for seg in [key("case-1", "s1"), key("case-1", "s2")] {
        coding
            .apply_code(&seg, &a.id, ApplicationSource::Ai, 0.9, "")
            .unwrap();
        coding
            .apply_code(&seg, &b.id, ApplicationSource::Ai, 0.9, "")
            .unwrap();
    }
    coding
        .apply_code(&key("case-1", "s1"), &c.id, ApplicationSource::Ai, 0.9, "")
        .unwrap();

    let pairs = themes.co_occurrence();
    // (A, B) co-occur twice; (A, C) and (B, C) once each.
    assert_eq!(pairs.len(), 3);
    assert_eq!(pairs[0].count, 2);
    assert_eq!(
        pairs.iter().filter(|p| p.count == 1).count(),
        2
    );
}
