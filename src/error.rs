use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream unavailable: {url}: {reason}")]
    UpstreamUnavailable { url: String, reason: String },

    #[error("{0} is required")]
    MissingRequiredParameter(&'static str),
}

pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    pub fn upstream(url: impl Into<String>, reason: impl ToString) -> Self {
        ProxyError::UpstreamUnavailable { url: url.into(), reason: reason.to_string() }
    }

    /// Attach the endpoint-specific public message for a 500.
    pub fn with_message(self, message: &'static str) -> ApiError {
        ApiError { inner: self, message }
    }
}

/// What a handler returns on failure. The upstream detail is logged, never sent.
#[derive(Debug)]
pub struct ApiError {
    inner: ProxyError,
    message: &'static str,
}

impl From<ProxyError> for ApiError {
    fn from(inner: ProxyError) -> Self {
        ApiError { inner, message: "Failed to scrape data from the source." }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.inner {
            ProxyError::MissingRequiredParameter(_) => {
                let body = json!({ "success": false, "error": self.inner.to_string() });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            ProxyError::UpstreamUnavailable { .. } => {
                tracing::error!(error = %self.inner, "{}", self.message);
                let body = json!({ "success": false, "error": self.message });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
