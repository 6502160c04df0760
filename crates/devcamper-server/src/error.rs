use crate::geocoder::GeocodeError;
use crate::response::Envelope;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use devcamper_core::StoreError;
use thiserror::Error;
use tracing::error;

/// Every handler returns `Result<_, ApiError>`; this is the only place
/// errors become HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl ApiError {
    pub fn not_found(what: &str, id: &str) -> Self {
        Self::NotFound(format!("{what} not found with id of {id}"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Client-facing message. Server-side details stay in the log.
    fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal server error".into(),
            Self::Upstream(_) => "upstream service unavailable".into(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound("resource not found".into()),
            StoreError::MalformedQuery(_) => Self::BadRequest(e.to_string()),
            StoreError::Validation(m) => Self::BadRequest(m),
            StoreError::Conflict(m) => Self::Conflict(m),
            StoreError::Internal(m) => Self::Internal(m),
        }
    }
}

impl From<GeocodeError> for ApiError {
    fn from(e: GeocodeError) -> Self {
        Self::Upstream(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), detail = %self, "request failed");
        }
        (status, Json(Envelope::error(self.public_message()))).into_response()
    }
}
