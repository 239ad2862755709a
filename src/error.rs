//! Error handling

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use crate::gemini::GeminiError;

/// Everything that can end a comic request early.
#[derive(Debug, Error)]
pub enum ComicError {
    #[error("only POST is allowed")]
    MethodNotAllowed,
    #[error("invalid request body: {0}")]
    InvalidRequest(String),
    #[error("request body too large: {0}")]
    PayloadTooLarge(String),
    #[error("invalid reference image: {0}")]
    InvalidReferenceImage(String),
    #[error("script generation failed: {0}")]
    UpstreamText(#[source] GeminiError),
    #[error("no valid comic script was produced: {0}")]
    InvalidScript(String),
    #[error("image generation failed for panel {panel}: {reason}")]
    UpstreamImage { panel: String, reason: String },
}

impl ComicError {
    pub fn status(&self) -> StatusCode {
        match self {
            ComicError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ComicError::InvalidRequest(_) | ComicError::InvalidReferenceImage(_) => StatusCode::BAD_REQUEST,
            ComicError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ComicError::UpstreamText(_) | ComicError::InvalidScript(_) | ComicError::UpstreamImage { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ComicError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        match &self {
            ComicError::MethodNotAllowed => {
                info!("🚫 Rejected non-POST request");
                (status, [(header::ALLOW, "POST")], body).into_response()
            }
            ComicError::InvalidRequest(_) | ComicError::InvalidReferenceImage(_) | ComicError::PayloadTooLarge(_) => {
                info!("⚠️ Bad request: {}", self);
                (status, body).into_response()
            }
            _ => {
                error!("❌ Comic generation failed: {}", self);
                (status, body).into_response()
            }
        }
    }
}
