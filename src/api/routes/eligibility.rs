//! Eligibility run endpoints.

use super::blocking;
use crate::api::errors::ApiError;
use crate::api::state::ApiState;
use crate::error::EligibilityError;
use crate::types::{EligibilityRun, RunSummary};
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

/// POST /eligibility/update
///
/// 409 while another run is active, 503 if the run fails; both are retryable.
pub async fn trigger_update(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<RunSummary>, ApiError> {
    info!("Manual eligibility update requested");
    let service = state.service.clone();
    let summary = blocking(move || service.trigger_update()).await?;
    Ok(Json(summary))
}

/// GET /eligibility/runs/latest
pub async fn latest_run(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<EligibilityRun>, ApiError> {
    let service = state.service.clone();
    let run = blocking(move || {
        service
            .latest_run()?
            .ok_or_else(|| EligibilityError::NotFound("no eligibility run recorded yet".into()))
    })
    .await?;
    Ok(Json(run))
}
