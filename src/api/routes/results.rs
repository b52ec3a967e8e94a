//! Test results, workers and tester analysis.

use super::blocking;
use crate::api::errors::ApiError;
use crate::api::state::ApiState;
use crate::types::{NewTestResult, TestResult, TestResultView, TesterAnalysis, Worker};
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultsQuery {
    pub worker_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWorkerRequest {
    pub worker_id: String,
    pub tester_name: String,
}

/// GET /tester-analysis
pub async fn tester_analysis(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<TesterAnalysis>>, ApiError> {
    let service = state.service.clone();
    let rows = blocking(move || service.tester_analysis()).await?;
    Ok(Json(rows))
}

/// GET /test-results?workerId=
pub async fn list_test_results(
    State(state): State<Arc<ApiState>>,
    query: Result<Query<TestResultsQuery>, QueryRejection>,
) -> Result<Json<Vec<TestResultView>>, ApiError> {
    let Query(query) = query?;
    let service = state.service.clone();
    let rows = blocking(move || service.test_results(query.worker_id.as_deref())).await?;
    Ok(Json(rows))
}

/// POST /test-results
pub async fn submit_test_result(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<NewTestResult>, JsonRejection>,
) -> Result<(StatusCode, Json<TestResult>), ApiError> {
    let Json(input) = body?;
    let service = state.service.clone();
    let result = blocking(move || service.submit_test_result(input)).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// POST /workers
pub async fn register_worker(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<RegisterWorkerRequest>, JsonRejection>,
) -> Result<Json<Worker>, ApiError> {
    let Json(req) = body?;
    let service = state.service.clone();
    let worker =
        blocking(move || service.register_worker(&req.worker_id, &req.tester_name)).await?;
    Ok(Json(worker))
}
