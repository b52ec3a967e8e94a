//! HTTP client for the eligibility API
//!
//! Used by the `eligibility` admin CLI and by services embedding the API.

use crate::api::ErrorBody;
use crate::policy::PolicyUpdate;
use crate::service::ThresholdSettings;
use crate::types::{
    EligibilityRun, NewTestResult, RunSummary, TestResult, TestResultView, TesterAnalysis,
    ThresholdPolicy, ThresholdType, Worker,
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status}: {}", .body.message)]
    Api { status: StatusCode, body: ErrorBody },

    #[error("unexpected response ({status}): {text}")]
    Unexpected { status: StatusCode, text: String },
}

impl ClientError {
    /// Whether the server said retrying later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Api { body, .. } => body.retryable,
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            ClientError::Unexpected { status, .. } => status.is_server_error(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

pub struct EligibilityClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl EligibilityClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> ClientResult<Self> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        self.http.request(method, url).bearer_auth(&self.token)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Err(ClientError::Api { status, body }),
            Err(_) => Err(ClientError::Unexpected { status, text }),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn write<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.send(self.request(method, path).json(body)).await
    }

    // ==================== Endpoints ====================

    pub async fn health(&self) -> ClientResult<bool> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    pub async fn threshold_settings(&self) -> ClientResult<ThresholdSettings> {
        self.get("/threshold-settings").await
    }

    pub async fn update_threshold_settings(
        &self,
        threshold_type: ThresholdType,
        value: Option<f64>,
    ) -> ClientResult<ThresholdPolicy> {
        let update = PolicyUpdate {
            threshold_type,
            value,
        };
        self.write(Method::PUT, "/threshold-settings", &update).await
    }

    pub async fn trigger_update(&self) -> ClientResult<RunSummary> {
        self.send(self.request(Method::POST, "/eligibility/update"))
            .await
    }

    pub async fn latest_run(&self) -> ClientResult<EligibilityRun> {
        self.get("/eligibility/runs/latest").await
    }

    pub async fn tester_analysis(&self) -> ClientResult<Vec<TesterAnalysis>> {
        self.get("/tester-analysis").await
    }

    pub async fn test_results(&self, worker_id: Option<&str>) -> ClientResult<Vec<TestResultView>> {
        let mut request = self.request(Method::GET, "/test-results");
        if let Some(worker_id) = worker_id {
            request = request.query(&[("workerId", worker_id)]);
        }
        self.send(request).await
    }

    pub async fn submit_test_result(&self, input: &NewTestResult) -> ClientResult<TestResult> {
        self.write(Method::POST, "/test-results", input).await
    }

    pub async fn register_worker(&self, worker_id: &str, tester_name: &str) -> ClientResult<Worker> {
        let body = serde_json::json!({ "workerId": worker_id, "testerName": tester_name });
        self.write(Method::POST, "/workers", &body).await
    }
}
