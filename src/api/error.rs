//! Errors surfaced by the API client and stored in query state.

/// A failed request, as seen by the client.
///
/// Cloneable so a single failure can be shared by every subscriber of a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
  /// The request never produced a response (connection refused, timeout, ...)
  #[error("Request failed: {0}")]
  Transport(String),

  /// The server answered with a non-success status.
  #[error("Server returned {status}: {message}")]
  Status { status: u16, message: String },

  /// The response body did not match the expected shape.
  #[error("Failed to decode response: {0}")]
  Decode(String),

  /// The request URL could not be built from the base URL.
  #[error("Invalid URL: {0}")]
  InvalidUrl(String),
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      ApiError::Decode(err.to_string())
    } else {
      ApiError::Transport(err.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    ApiError::Decode(err.to_string())
  }
}

impl From<url::ParseError> for ApiError {
  fn from(err: url::ParseError) -> Self {
    ApiError::InvalidUrl(err.to_string())
  }
}
