//! Endpoints of HTTP server.
//!
use std::sync::Arc;

use axum::{
    body::StreamBody,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Extension,
};

use crate::{app::AppContext, multipart::CONTENT_TYPE};

const INDEX_HTML: &str = include_str!("../templates/index.html");

/// Static page embedding the video stream.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

/// Endpoint of the annotated video stream.
pub async fn video_feed(Extension(ctx): Extension<Arc<AppContext>>) -> Response {
    match ctx.open_stream() {
        Some(stream) => {
            log::info!("Video stream requested");

            // Set body and headers for multipart streaming
            let body = StreamBody::new(stream);
            let headers = [
                (header::CONTENT_TYPE, CONTENT_TYPE),
                (header::CACHE_CONTROL, "no-cache"),
            ];

            (headers, body).into_response()
        }
        None => {
            log::warn!("Rejecting video stream, the camera is busy with another client");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "The video feed is already streaming to another client",
            )
                .into_response()
        }
    }
}
