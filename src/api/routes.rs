//! Router construction and the multipart transform endpoint

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::coordinator::RawRequest;
use crate::error::{AppError, Result};
use crate::response;
use crate::validation::RawUpload;
use crate::AppState;

/// Slack on top of the configured image size for the other form fields
const BODY_OVERHEAD: usize = 64 * 1024;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.settings.image.max_file_size + BODY_OVERHEAD;

    Router::new()
        .route("/images", post(transform_image))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /images: transform the uploaded image with the prompt
async fn transform_image(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    multipart: Multipart,
) -> Result<Response> {
    let mut request = read_multipart(multipart).await?;
    request.client = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());

    let bytes = state.coordinator.handle(request).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, response::CONTENT_TYPE)],
        bytes,
    )
        .into_response())
}

/// GET /health: ready only once the model resource is
async fn health(State(state): State<Arc<AppState>>) -> Response {
    if state.coordinator.model().is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        )
            .into_response()
    }
}

/// Collect the known fields from the multipart body. Unknown fields are
/// ignored; missing ones surface later as stage-tagged errors.
async fn read_multipart(mut multipart: Multipart) -> Result<RawRequest> {
    let mut request = RawRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Multipart(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Multipart(e.to_string()))?;

        match name.as_str() {
            "image" => {
                request.image = Some(RawUpload {
                    bytes: bytes.to_vec(),
                    content_type,
                    filename,
                });
            }
            "prompt" => {
                request.prompt = Some(RawUpload {
                    bytes: bytes.to_vec(),
                    content_type,
                    filename,
                });
            }
            "num_inference_steps" => {
                request.num_inference_steps =
                    Some(String::from_utf8_lossy(&bytes).into_owned());
            }
            "image_guidance_scale" => {
                request.image_guidance_scale =
                    Some(String::from_utf8_lossy(&bytes).into_owned());
            }
            _ => {}
        }
    }

    Ok(request)
}
