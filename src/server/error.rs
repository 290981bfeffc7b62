use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::fmt::Display;

use crate::api::types::ErrorBody;

/// Failure of a handler.
///
/// Every failure, whatever its cause, becomes a 500 with
/// `{"message": "Error <action> : <cause>"}`.
#[derive(Debug, thiserror::Error)]
#[error("Error {action} : {cause}")]
pub struct AppError {
  action: &'static str,
  cause: String,
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
  pub fn new(action: &'static str, cause: impl Display) -> Self {
    Self {
      action,
      cause: cause.to_string(),
    }
  }

  /// Adapter for `map_err`: `db.list_projects().map_err(AppError::during("retrieving projects"))`.
  pub fn during<E: Display>(action: &'static str) -> impl FnOnce(E) -> Self {
    move |cause| Self::new(action, cause)
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let message = self.to_string();
    tracing::error!(action = self.action, cause = %self.cause, "request failed");

    (
      StatusCode::INTERNAL_SERVER_ERROR,
      Json(ErrorBody { message }),
    )
      .into_response()
  }
}
