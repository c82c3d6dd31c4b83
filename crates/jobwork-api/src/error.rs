//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use jobwork_core::store::{ClassifyError, StoreErrorKind};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The event is not a valid transition for the voucher.
  #[error("rejected: {0}")]
  Rejected(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("precondition failed: {0}")]
  PreconditionFailed(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Map a backend error onto a response class.
  pub fn from_store<E>(e: E) -> Self
  where
    E: std::error::Error + ClassifyError + Send + Sync + 'static,
  {
    match e.kind() {
      StoreErrorKind::NotFound => ApiError::NotFound(e.to_string()),
      StoreErrorKind::Rejected => ApiError::Rejected(e.to_string()),
      StoreErrorKind::Conflict => ApiError::Conflict(e.to_string()),
      StoreErrorKind::PreconditionFailed => ApiError::PreconditionFailed(e.to_string()),
      StoreErrorKind::Internal => ApiError::Store(Box::new(e)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Rejected(m) | ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::PreconditionFailed(m) => (StatusCode::PRECONDITION_FAILED, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
