// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Route handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::Uri,
    Json,
};
use axum_extra::extract::Multipart;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::errors::{multipart_error, ApiError};
use super::server::AppState;
use crate::caption::request::parse_model_name;
use crate::caption::{CaptionError, CaptionRequest, CaptionResponse};
use crate::translation::Language;
use crate::version;
use crate::vision::image_utils::decode_base64_payload;
use crate::vision::registry::ModelInfo;

/// JSON body for `POST /api/caption/base64`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Base64CaptionRequest {
    /// Base64 image, optionally with a `data:` URL prefix
    pub image: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub success: bool,
    pub languages: &'static [Language],
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub success: bool,
    pub models: Vec<ModelInfo>,
    pub current_model: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub device: String,
    pub loaded_models: Vec<String>,
    pub version: &'static str,
    pub timestamp: String,
}

/// POST /api/caption - multipart upload with `image`, `model` and `language` fields
pub async fn caption_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CaptionResponse>, ApiError> {
    let max_bytes = state.pipeline.max_image_bytes();
    let mut image: Option<Bytes> = None;
    let mut model: Option<String> = None;
    let mut language: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let data = field.bytes().await.map_err(|e| multipart_error(e, max_bytes))?;
                debug!("received image field: {} bytes", data.len());
                image = Some(data);
            }
            "model" => {
                model = Some(field.text().await.map_err(|e| multipart_error(e, max_bytes))?);
            }
            "language" => {
                language = Some(field.text().await.map_err(|e| multipart_error(e, max_bytes))?);
            }
            other => debug!("ignoring form field {}", other),
        }
    }

    let default_key = state.pipeline.registry().default_key();
    // Model before image so an unknown model never costs an upload check
    parse_model_name(model.as_deref(), default_key)?;

    let image = image
        .filter(|b| !b.is_empty())
        .ok_or_else(|| CaptionError::InvalidImage("no image provided".to_string()))?;

    let request = CaptionRequest::new(image, model.as_deref(), language.as_deref(), default_key)?;
    let result = state.pipeline.caption(request).await?;
    Ok(Json(CaptionResponse::from(result)))
}

/// POST /api/caption/base64 - JSON body with a base64 image
pub async fn caption_base64_handler(
    State(state): State<AppState>,
    payload: Result<Json<Base64CaptionRequest>, JsonRejection>,
) -> Result<Json<CaptionResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let default_key = state.pipeline.registry().default_key();
    parse_model_name(body.model.as_deref(), default_key)?;

    let bytes = decode_base64_payload(&body.image).map_err(CaptionError::from)?;
    let request = CaptionRequest::new(
        Bytes::from(bytes),
        body.model.as_deref(),
        body.language.as_deref(),
        default_key,
    )?;
    let result = state.pipeline.caption(request).await?;
    Ok(Json(CaptionResponse::from(result)))
}

/// GET /api/languages
pub async fn languages_handler(State(state): State<AppState>) -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        success: true,
        languages: state.pipeline.translator().languages(),
    })
}

/// GET /api/models
pub async fn models_handler(State(state): State<AppState>) -> Json<ModelsResponse> {
    let registry = state.pipeline.registry();
    Json(ModelsResponse {
        success: true,
        models: registry.list_models(),
        current_model: registry.default_key().to_string(),
    })
}

/// GET /api/health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.pipeline.registry();
    let device = registry
        .loaded_device(registry.default_key())
        .unwrap_or_else(|| registry.device());
    Json(HealthResponse {
        status: "healthy",
        model: registry.default_key().to_string(),
        device: device.to_string(),
        loaded_models: registry
            .loaded_models()
            .iter()
            .map(|k| k.to_string())
            .collect(),
        version: version::VERSION_NUMBER,
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Fallback for unknown routes
pub async fn not_found_handler(uri: Uri) -> ApiError {
    info!("no route for {}", uri.path());
    ApiError::NotFound(uri.path().to_string())
}
