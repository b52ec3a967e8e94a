//! API error responses.
//!
//! Every failure leaves the API as `{error, message, retryable}` with a
//! status code derived from the engine error.

use crate::error::EligibilityError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Wire shape of an error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl From<EligibilityError> for ApiError {
    fn from(err: EligibilityError) -> Self {
        let message = err.to_string();
        match err {
            EligibilityError::Validation(_) => Self::bad_request(message),
            EligibilityError::RunAlreadyInProgress(_) => {
                Self::new(StatusCode::CONFLICT, "run_already_in_progress", message).retryable()
            }
            EligibilityError::RunFailed(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "run_failed", message).retryable()
            }
            EligibilityError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            EligibilityError::Storage(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}: {}", self.status.as_u16(), self.code, self.message);
        } else {
            warn!("{} {}: {}", self.status.as_u16(), self.code, self.message);
        }

        (
            self.status,
            Json(ErrorBody {
                error: self.code.to_string(),
                message: self.message,
                retryable: self.retryable,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                EligibilityError::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
                false,
            ),
            (
                EligibilityError::RunAlreadyInProgress(Uuid::new_v4()),
                StatusCode::CONFLICT,
                true,
            ),
            (
                EligibilityError::RunFailed("commit".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                true,
            ),
            (
                EligibilityError::NotFound("worker x".into()),
                StatusCode::NOT_FOUND,
                false,
            ),
            (
                EligibilityError::Storage(StorageError::Database("locked".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
            ),
        ];

        for (err, status, retryable) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, status);
            assert_eq!(api.retryable, retryable);
        }
    }
}
