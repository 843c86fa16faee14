// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP server for the caption node

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{
    caption_base64_handler, caption_handler, health_handler, languages_handler, models_handler,
    not_found_handler,
};
use crate::caption::CaptionPipeline;

/// Room for multipart framing and form fields around the image itself
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<CaptionPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<CaptionPipeline>) -> Self {
        Self { pipeline }
    }
}

/// Request body limit for a given image limit
///
/// Base64 inflates the payload by a third, so the limit covers an encoded
/// maximum-size image; anything between the image limit and this one is
/// rejected by the pipeline with a typed 413.
pub fn body_limit(max_image_bytes: usize) -> usize {
    max_image_bytes
        .saturating_add(max_image_bytes / 3 + 4)
        .saturating_add(BODY_OVERHEAD_BYTES)
}

pub fn create_router(state: AppState) -> Router {
    let limit = body_limit(state.pipeline.max_image_bytes());

    Router::new()
        .route("/api/caption", post(caption_handler))
        .route("/api/caption/base64", post(caption_base64_handler))
        .route("/api/languages", get(languages_handler))
        .route("/api/models", get(models_handler))
        .route("/api/health", get(health_handler))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves
pub async fn start_server<F>(state: AppState, addr: &str, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Caption API listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
