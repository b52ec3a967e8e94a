//! Integration tests for the HTTP API
//!
//! Starts the real router on a loopback port and drives it with
//! `EligibilityClient`, the same way the admin CLI does.

use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use worker_eligibility::server::{build_app, build_state};
use worker_eligibility::{
    ClientError, Eligibility, EligibilityClient, EngineConfig, MemoryStore, NewTestResult,
    SqliteStore, ThresholdType,
};

const TOKEN: &str = "integration-token";

// ============================================================================
// TEST HELPERS
// ============================================================================

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.auth.tokens = vec![TOKEN.to_string()];
    config.eligibility.recompute_on_policy_change = false;
    config
}

/// Serve the API on an ephemeral port, returning its base URL
async fn spawn_server(config: EngineConfig, store: Arc<dyn worker_eligibility::EligibilityStore>) -> String {
    let state = build_state(&config, store).unwrap();
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn submission(worker: &str, score: f64) -> NewTestResult {
    NewTestResult {
        worker_id: worker.to_string(),
        tester_name: None,
        test_id: "task-1".to_string(),
        score,
        feedback: Some("auto".to_string()),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_full_flow_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("api.db")).unwrap());
    let url = spawn_server(test_config(), store).await;
    let client = EligibilityClient::new(&url, TOKEN).unwrap();

    assert!(client.health().await.unwrap());

    let settings = client.threshold_settings().await.unwrap();
    assert_eq!(settings.policy.threshold_type, ThresholdType::Median);
    assert_eq!(settings.effective_threshold, None);

    client.register_worker("w-1", "Alice").await.unwrap();
    for (worker, score) in [("w-1", 0.5), ("w-2", 0.6), ("w-3", 0.9)] {
        client.submit_test_result(&submission(worker, score)).await.unwrap();
    }

    let summary = client.trigger_update().await.unwrap();
    assert_eq!(summary.threshold, Some(0.6));
    assert_eq!(summary.eligible_count, 2);
    assert_eq!(summary.not_eligible_count, 1);

    let analysis = client.tester_analysis().await.unwrap();
    assert_eq!(analysis.len(), 3);
    assert_eq!(analysis[0].tester_name, "Alice");
    assert_eq!(analysis[0].is_eligible, Eligibility::NotEligible);

    let results = client.test_results(None).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.feedback.as_deref() == Some("auto")));

    let run = client.latest_run().await.unwrap();
    assert_eq!(run.id, summary.run_id);
}

#[tokio::test]
async fn test_policy_update_and_validation() {
    let url = spawn_server(test_config(), Arc::new(MemoryStore::new())).await;
    let client = EligibilityClient::new(&url, TOKEN).unwrap();

    let policy = client
        .update_threshold_settings(ThresholdType::Custom, Some(0.75))
        .await
        .unwrap();
    assert_eq!(policy.value, Some(0.75));

    let err = client
        .update_threshold_settings(ThresholdType::Custom, None)
        .await
        .unwrap_err();
    match err {
        ClientError::Api { status, body } => {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(!body.retryable);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let settings = client.threshold_settings().await.unwrap();
    assert_eq!(settings.policy.value, Some(0.75));
    assert_eq!(settings.effective_threshold, Some(0.75));
}

#[tokio::test]
async fn test_wrong_token_rejected() {
    let url = spawn_server(test_config(), Arc::new(MemoryStore::new())).await;
    let client = EligibilityClient::new(&url, "some-other-token").unwrap();

    assert!(client.health().await.unwrap());
    let err = client.tester_analysis().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Api { status, .. } if status == StatusCode::UNAUTHORIZED
    ));
}

#[tokio::test]
async fn test_policy_change_triggers_recompute() {
    let mut config = test_config();
    config.eligibility.recompute_on_policy_change = true;
    let url = spawn_server(config, Arc::new(MemoryStore::new())).await;
    let client = EligibilityClient::new(&url, TOKEN).unwrap();

    client.submit_test_result(&submission("solo", 0.4)).await.unwrap();
    client
        .update_threshold_settings(ThresholdType::Custom, Some(0.3))
        .await
        .unwrap();

    let mut status = Eligibility::Pending;
    for _ in 0..100 {
        status = client.tester_analysis().await.unwrap()[0].is_eligible;
        if status != Eligibility::Pending {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, Eligibility::Eligible);
}
