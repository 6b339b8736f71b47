//! Errors surfaced to HTTP callers before a response stream is committed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::upstream::UpstreamError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Error, body too big for this handler ({size} bytes, limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Error, empty body")]
    EmptyPayload,

    #[error("Missing sessionID")]
    MissingSessionId,

    #[error("Error from upstream: {0}")]
    Upstream(#[from] UpstreamError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge { .. } | Self::EmptyPayload | Self::MissingSessionId => {
                StatusCode::BAD_REQUEST
            }
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Upstream(e) => error!(error = %e, "Upstream request failed"),
            other => warn!(error = %other, "Request rejected"),
        }
        (status, self.to_string()).into_response()
    }
}
