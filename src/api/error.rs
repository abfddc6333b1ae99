//! HTTP mapping for engine errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::error::CohesionError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Cohesion(#[from] CohesionError),

    /// The blocking worker running an engine call panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Cohesion(CohesionError::validation(message))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Cohesion(err) => match err {
                CohesionError::Validation(_) => StatusCode::BAD_REQUEST,
                CohesionError::NotFound { .. } => StatusCode::NOT_FOUND,
                CohesionError::BuildTimeout { .. } | CohesionError::UpstreamStore(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                CohesionError::Config(_) | CohesionError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cohesion(err) => match err {
                CohesionError::Validation(_) => "VALIDATION_ERROR",
                CohesionError::NotFound { .. } => "NOT_FOUND",
                CohesionError::BuildTimeout { .. } => "BUILD_TIMEOUT",
                CohesionError::UpstreamStore(_) => "UPSTREAM_STORE",
                CohesionError::Config(_) => "CONFIG_ERROR",
                CohesionError::Internal(_) => "INTERNAL_ERROR",
            },
            Self::Worker(_) => "INTERNAL_ERROR",
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            Self::Cohesion(err) => err.is_retryable(),
            Self::Worker(_) => true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "API error");
        } else {
            tracing::warn!(error = %self, code = self.error_code(), "API error");
        }

        let body = ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            retryable: self.retryable(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
