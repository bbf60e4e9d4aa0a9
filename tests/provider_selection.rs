//! Provider selection truth table and request preflight

mod common;

use common::{noise_png, pipeline_with, CountingSource};
use roomstage::{
    CredentialPresence, Credentials, Environment, ErrorCode, ProviderState, StagingConfig,
    StagingInput,
};
use std::collections::HashMap;

fn presence(renderer: bool, editor: bool, planner: bool) -> CredentialPresence {
    CredentialPresence {
        renderer,
        editor,
        planner,
    }
}

fn expected(p: CredentialPresence, mock: bool) -> ProviderState {
    match (mock, p.renderer, p.planner, p.editor) {
        (true, ..) => ProviderState::Mock,
        (false, true, true, _) => ProviderState::ProviderAWithPlanner,
        (false, true, false, _) => ProviderState::ProviderANoPlanner,
        (false, false, _, true) => ProviderState::ProviderBFallback,
        (false, false, _, false) => ProviderState::NoProvider,
    }
}

#[test]
fn test_selection_truth_table() {
    let mut seen = Vec::new();
    for bits in 0u8..16 {
        let p = presence(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0);
        let mock = bits & 8 != 0;
        let state = ProviderState::select(p, mock);
        assert_eq!(state, expected(p, mock), "presence {:?}, mock {}", p, mock);
        seen.push(state);
    }

    for state in [
        ProviderState::NoProvider,
        ProviderState::ProviderAWithPlanner,
        ProviderState::ProviderANoPlanner,
        ProviderState::ProviderBFallback,
        ProviderState::Mock,
    ] {
        assert!(seen.contains(&state), "{} never selected", state);
    }
}

#[test]
fn test_planner_alone_selects_nothing() {
    assert_eq!(
        ProviderState::select(presence(false, false, true), false),
        ProviderState::NoProvider
    );
    assert_eq!(
        ProviderState::select(presence(false, true, true), false),
        ProviderState::ProviderBFallback
    );
}

#[test]
fn test_credentials_from_environment_drive_selection() {
    let vars: HashMap<String, String> = [
        ("STABILITY_API_KEY", "sk-stability"),
        ("GEMINI_API_KEY", "  "),
        ("NODE_ENV", "production"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let config = StagingConfig::from_env_map(&vars).unwrap();
    let p = config.credentials.presence();
    assert!(p.renderer);
    assert!(!p.planner, "blank keys count as missing");
    assert_eq!(
        ProviderState::select(p, config.force_mock),
        ProviderState::ProviderANoPlanner
    );
}

#[test]
fn test_credentials_debug_is_redacted() {
    let credentials = Credentials {
        stability_api_key: Some("sk-very-secret".to_string()),
        openai_api_key: None,
        gemini_api_key: None,
    };
    let shown = format!("{:?}", credentials);
    assert!(!shown.contains("sk-very-secret"));
}

#[test]
fn test_mock_fallback_only_in_development() {
    for (environment, allow, permitted) in [
        (Environment::Development, true, true),
        (Environment::Development, false, false),
        (Environment::Test, true, false),
        (Environment::Production, true, false),
    ] {
        let config = StagingConfig::builder()
            .environment(environment)
            .allow_mock_fallback(allow)
            .build()
            .unwrap();
        assert_eq!(
            config.mock_fallback_permitted(),
            permitted,
            "{:?} allow={}",
            environment,
            allow
        );
    }
}

#[tokio::test]
async fn test_missing_keys_fail_before_any_load() {
    let config = StagingConfig::builder()
        .environment(Environment::Production)
        .allow_mock_fallback(true)
        .build()
        .unwrap();
    let source = CountingSource::serving(noise_png(320, 240, 1));
    let (pipeline, store) = pipeline_with(&config, source.clone(), roomstage::ProviderSet::empty());

    let outcome = pipeline
        .generate_staged_design(StagingInput::new("/uploads/room.jpg", "modern"))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_code, Some(ErrorCode::MissingProviderKey));
    assert!(!outcome.retryable);
    assert!(outcome.image_url.is_none());
    assert_eq!(source.load_count(), 0);
    assert!(store.paths().is_empty());
}

#[tokio::test]
async fn test_force_mock_ignores_missing_keys() {
    let config = StagingConfig::builder().force_mock(true).build().unwrap();
    let source = CountingSource::serving(noise_png(320, 240, 2));
    let (pipeline, store) = pipeline_with(&config, source.clone(), roomstage::ProviderSet::empty());
    assert_eq!(pipeline.provider_state(), ProviderState::Mock);

    let outcome = pipeline
        .generate_staged_design(StagingInput::new("/uploads/room.jpg", "coastal"))
        .await;

    assert!(outcome.success, "{:?}", outcome.error_message);
    assert_eq!(outcome.provider_used, Some(roomstage::ProviderKind::Mock));
    assert!(outcome.low_confidence);
    assert_eq!(source.load_count(), 1);
    assert_eq!(store.paths().len(), 1);
}
