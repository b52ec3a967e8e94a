//! Request middleware.

use crate::api::errors::ApiError;
use crate::api::state::ApiState;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Reject requests without an accepted `Authorization: Bearer` token
pub async fn require_bearer(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if !state.auth.authorize_header(header).await {
        return ApiError::unauthorized().into_response();
    }

    next.run(request).await
}
