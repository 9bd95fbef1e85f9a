use crate::repository::RepoError;
use crate::validation::ValidationErrors;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Failed validation: {0:?}")]
    FailedValidation(ValidationErrors),
    #[error("Resource not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Edit conflict")]
    EditConflict,
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Option<Duration> },
    #[error("Storage operation timed out")]
    Timeout,
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::EditConflict => ApiError::EditConflict,
            RepoError::Timeout => ApiError::Timeout,
            RepoError::Storage(source) => ApiError::Storage(source.to_string()),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::FailedValidation(errors)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<ValidationErrors>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: StatusCode) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code: code.as_u16(),
            fields: None,
        }
    }

    /// Body for `err`. Server-side failures never carry their internal detail.
    pub fn from_api_error(err: &ApiError) -> Self {
        match err {
            ApiError::BadRequest(msg) => Self::new("bad_request", msg, StatusCode::BAD_REQUEST),
            ApiError::FailedValidation(fields) => Self {
                fields: Some(fields.clone()),
                ..Self::new(
                    "failed_validation",
                    "the request contains invalid values",
                    StatusCode::UNPROCESSABLE_ENTITY,
                )
            },
            ApiError::NotFound => Self::new(
                "not_found",
                "the requested resource could not be found",
                StatusCode::NOT_FOUND,
            ),
            ApiError::MethodNotAllowed => Self::new(
                "method_not_allowed",
                "the method is not supported for this resource",
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            ApiError::EditConflict => Self::new(
                "edit_conflict",
                "unable to update the record due to an edit conflict, please try again",
                StatusCode::CONFLICT,
            ),
            ApiError::RateLimitExceeded { .. } => Self::new(
                "rate_limit_exceeded",
                "rate limit exceeded",
                StatusCode::TOO_MANY_REQUESTS,
            ),
            ApiError::Timeout | ApiError::Storage(_) | ApiError::Internal(_) => Self::new(
                "internal_error",
                SERVER_ERROR_MESSAGE,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Timeout | ApiError::Storage(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Timeout => {
                tracing::error!(target: "reelvault::error", "storage deadline exceeded");
            }
            ApiError::Storage(msg) => {
                tracing::error!(target: "reelvault::error", error = %msg, "storage failure");
            }
            ApiError::Internal(msg) => {
                tracing::error!(
                    target: "reelvault::error",
                    error = %msg,
                    "internal invariant violated"
                );
            }
            _ => {}
        }

        let body = ErrorResponse::from_api_error(&self);
        let mut response = (self.status_code(), Json(body)).into_response();

        if let ApiError::RateLimitExceeded {
            retry_after: Some(wait),
        } = &self
        {
            let secs = wait.as_secs_f64().ceil().max(1.0) as u64;
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
