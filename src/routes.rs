use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    routing::post,
    Form, Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    comic::ComicPipeline,
    error::ComicError,
    models::{GenerateRequest, GenerateResponse},
};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ComicPipeline>,
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/generate", post(generate_comic).fallback(method_not_allowed))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Comic request body, JSON or urlencoded form depending on `Content-Type`.
pub struct ComicForm(pub GenerateRequest);

#[async_trait]
impl<S> FromRequest<S> for ComicForm
where
    S: Send + Sync,
{
    type Rejection = ComicError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(body) = Form::<GenerateRequest>::from_request(req, state)
                .await
                .map_err(|e| body_rejection(e.status(), e.body_text()))?;
            return Ok(Self(body));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| body_rejection(e.status(), e.body_text()))?;
        let body = serde_json::from_slice(&bytes).map_err(|e| ComicError::InvalidRequest(e.to_string()))?;
        Ok(Self(body))
    }
}

/// Oversized bodies keep axum's 413; every other rejection is a 400.
fn body_rejection(status: StatusCode, message: String) -> ComicError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ComicError::PayloadTooLarge(message)
    } else {
        ComicError::InvalidRequest(message)
    }
}

pub async fn generate_comic(
    State(state): State<AppState>,
    ComicForm(body): ComicForm,
) -> Result<Json<GenerateResponse>, ComicError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("generate_comic", %request_id);
    state.pipeline.generate(body).instrument(span).await.map(Json)
}

pub async fn method_not_allowed() -> ComicError {
    ComicError::MethodNotAllowed
}
