//! Threshold settings endpoints.

use super::blocking;
use crate::api::errors::ApiError;
use crate::api::state::ApiState;
use crate::policy::PolicyUpdate;
use crate::service::ThresholdSettings;
use crate::types::ThresholdPolicy;
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use std::sync::Arc;

/// GET /threshold-settings
pub async fn get_threshold_settings(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<ThresholdSettings>, ApiError> {
    let service = state.service.clone();
    let settings = blocking(move || service.threshold_settings()).await?;
    Ok(Json(settings))
}

/// PUT /threshold-settings
///
/// Body `{type, value?}`. A rejected update leaves the stored policy as it was.
pub async fn update_threshold_settings(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<PolicyUpdate>, JsonRejection>,
) -> Result<Json<ThresholdPolicy>, ApiError> {
    let Json(update) = body?;
    let service = state.service.clone();
    let policy = blocking(move || service.update_threshold_settings(&update)).await?;
    Ok(Json(policy))
}
