//! Mapping from domain errors to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{CoreError, FieldErrors};
use tracing::{error, warn};

/// Error returned by handlers. Every variant renders as JSON.
#[derive(Debug)]
pub enum ApiError {
    /// 400 with the field -> messages map as the body.
    Validation(FieldErrors),
    /// 400 with `{"message": ...}`.
    BadRequest(String),
    /// 404 with `{"message": ...}`.
    NotFound(String),
    /// 500; the detail is logged, never returned.
    Internal(String),
}

impl ApiError {
    /// Like `From<CoreError>`, but a 404 message without the id.
    /// The user CRUD routes answer `Invalid user ID`.
    pub fn without_id(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, .. } => {
                ApiError::NotFound(format!("Invalid {} ID", entity))
            }
            other => other.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(errs) => ApiError::Validation(errs),
            CoreError::NotFound { entity, id } => {
                ApiError::NotFound(http_common::invalid_id_message(entity.as_str(), id))
            }
            CoreError::ProductNotInOrder {
                order_id,
                product_id,
            } => ApiError::BadRequest(format!("Product {} not in order {}", product_id, order_id)),
            // Unique-column collisions are persistence failures like any other.
            CoreError::AlreadyExists(what) => {
                ApiError::Internal(format!("unique constraint: {} already exists", what))
            }
            CoreError::Repository(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errs) => {
                warn!(fields = %errs, "validation failed");
                (
                    StatusCode::BAD_REQUEST,
                    Json(http_common::json_field_errors(&errs)),
                )
                    .into_response()
            }
            ApiError::BadRequest(msg) => {
                warn!(%msg, "bad request");
                (StatusCode::BAD_REQUEST, Json(http_common::json_message(&msg))).into_response()
            }
            ApiError::NotFound(msg) => {
                warn!(%msg, "not found");
                (StatusCode::NOT_FOUND, Json(http_common::json_message(&msg))).into_response()
            }
            ApiError::Internal(msg) => {
                error!(err = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(http_common::json_internal_error()),
                )
                    .into_response()
            }
        }
    }
}
