//! REST API implementation.
//!
//! ```text
//! GET  /health                   - liveness, no auth
//! GET  /threshold-settings       - current policy + effective cutoff
//! PUT  /threshold-settings       - update policy
//! POST /eligibility/update       - run a recomputation
//! GET  /eligibility/runs/latest  - last run record
//! GET  /tester-analysis          - per-worker accuracy and verdict
//! GET  /test-results             - results with eligibility status
//! POST /test-results             - record a result
//! POST /workers                  - register a worker
//! ```

pub mod errors;
pub mod middleware;
pub mod routes;
pub mod state;

pub use errors::{ApiError, ErrorBody};
pub use state::ApiState;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router. Tracing and CORS layers are added by the server.
pub fn router(state: Arc<ApiState>) -> Router {
    let protected = Router::new()
        .route(
            "/threshold-settings",
            get(routes::get_threshold_settings).put(routes::update_threshold_settings),
        )
        .route("/eligibility/update", post(routes::trigger_update))
        .route("/eligibility/runs/latest", get(routes::latest_run))
        .route("/tester-analysis", get(routes::tester_analysis))
        .route(
            "/test-results",
            get(routes::list_test_results).post(routes::submit_test_result),
        )
        .route("/workers", post(routes::register_worker))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_bearer,
        ));

    Router::new()
        .route("/health", get(routes::health_check))
        .merge(protected)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenAuth;
    use crate::config::EligibilityConfig;
    use crate::service::EligibilityService;
    use crate::storage::EligibilityStore;
    use crate::test_support::{seed_worker, FlakyStore};
    use crate::types::{RunStatus, RunTrigger};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tower::ServiceExt;

    const TOKEN: &str = "test-token-123";

    fn setup() -> (Arc<FlakyStore>, Arc<EligibilityService>, Router) {
        let store = Arc::new(FlakyStore::new());
        let service = Arc::new(
            EligibilityService::new(store.clone(), &EligibilityConfig::default()).unwrap(),
        );
        let state = Arc::new(ApiState::new(
            service.clone(),
            TokenAuth::with_tokens([TOKEN]),
        ));
        (store, service, router(state))
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", TOKEN));
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let (_, _, app) = setup();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_or_wrong_bearer_is_401() {
        let (_, _, app) = setup();

        let req = Request::builder()
            .uri("/threshold-settings")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let req = Request::builder()
            .method("POST")
            .uri("/eligibility/update")
            .header("authorization", "Bearer not-the-token")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_policy_round_trip() {
        let (_, _, app) = setup();

        let (status, before) = send(&app, request("GET", "/threshold-settings", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(before["type"], "MEDIAN");

        let (status, updated) = send(
            &app,
            request("PUT", "/threshold-settings", Some(json!({"type": "MEDIAN"}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(updated["value"].is_null());

        let (_, after) = send(&app, request("GET", "/threshold-settings", None)).await;
        assert_eq!(after["type"], "MEDIAN");
        assert!(after["value"].is_null());
        assert_eq!(after["lastUpdated"], updated["lastUpdated"]);
        assert_eq!(after["quorum"], 3);
    }

    #[tokio::test]
    async fn test_invalid_policy_is_400() {
        let (_, _, app) = setup();

        for body in [
            json!({"type": "CUSTOM"}),
            json!({"type": "CUSTOM", "value": 1.5}),
            json!({"type": "MODE"}),
        ] {
            let (status, err) =
                send(&app, request("PUT", "/threshold-settings", Some(body))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(err["error"], "validation_error");
            assert_eq!(err["retryable"], false);
        }

        let (_, settings) = send(&app, request("GET", "/threshold-settings", None)).await;
        assert_eq!(settings["type"], "MEDIAN");
    }

    #[tokio::test]
    async fn test_submit_run_and_read_back() {
        let (_, _, app) = setup();

        for (worker, name, score) in [("a", "Ann", 0.5), ("b", "Ben", 0.6), ("c", "Cat", 0.9)] {
            let (status, created) = send(
                &app,
                request(
                    "POST",
                    "/test-results",
                    Some(json!({
                        "workerId": worker,
                        "testerName": name,
                        "testId": "t-1",
                        "score": score,
                        "feedback": "ok"
                    })),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(created["workerId"], worker);
        }

        let (status, summary) = send(&app, request("POST", "/eligibility/update", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["eligibleCount"], 2);
        assert_eq!(summary["notEligibleCount"], 1);
        assert_eq!(summary["threshold"], 0.6);

        let (_, analysis) = send(&app, request("GET", "/tester-analysis", None)).await;
        let statuses: Vec<_> = analysis
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["isEligible"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(statuses, vec!["not_eligible", "eligible", "eligible"]);
        assert_eq!(analysis[0]["testerName"], "Ann");

        let (_, results) = send(&app, request("GET", "/test-results?workerId=c", None)).await;
        assert_eq!(results.as_array().unwrap().len(), 1);
        assert_eq!(results[0]["eligibilityStatus"], "eligible");
        assert_eq!(results[0]["feedback"], "ok");

        let (_, run) = send(&app, request("GET", "/eligibility/runs/latest", None)).await;
        assert_eq!(run["status"], "succeeded");
        assert_eq!(run["id"], summary["runId"]);
    }

    #[tokio::test]
    async fn test_bad_intake_is_400() {
        let (_, _, app) = setup();
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/test-results",
                Some(json!({"workerId": "a", "testId": "t", "score": 3.0})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            request("POST", "/test-results", Some(json!({"workerId": "a"}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            request("POST", "/workers", Some(json!({"workerId": "", "testerName": "X"}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_worker_filter_is_404() {
        let (_, _, app) = setup();
        let (status, body) = send(&app, request("GET", "/test-results?workerId=ghost", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, _) = send(&app, request("GET", "/eligibility/runs/latest", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_trigger_is_409() {
        let (store, service, app) = setup();
        seed_worker(store.as_ref(), "w-1", &[0.9]);
        let gate = store.gate_next_snapshot();

        let background = {
            let service = service.clone();
            std::thread::spawn(move || service.trigger_update())
        };
        gate.entered.recv_timeout(Duration::from_secs(5)).unwrap();

        let (status, body) = send(&app, request("POST", "/eligibility/update", None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "run_already_in_progress");
        assert_eq!(body["retryable"], true);

        let (_, run) = send(&app, request("GET", "/eligibility/runs/latest", None)).await;
        assert_eq!(run["status"], "running");

        gate.release.send(()).unwrap();
        background.join().unwrap().unwrap();
        assert_eq!(store.latest_verdicts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_run_is_503_and_keeps_verdicts() {
        let (store, service, app) = setup();
        seed_worker(store.as_ref(), "w-1", &[0.9]);
        let first = service
            .coordinator()
            .trigger_update(RunTrigger::Manual)
            .unwrap();

        store.fail_commit.store(true, Ordering::SeqCst);
        let (status, body) = send(&app, request("POST", "/eligibility/update", None)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "run_failed");
        assert_eq!(body["retryable"], true);

        let verdicts = store.latest_verdicts().unwrap();
        assert_eq!(verdicts[0].run_id, first.run_id);
        assert_eq!(
            service.latest_run().unwrap().unwrap().status,
            RunStatus::Failed
        );
    }
}
