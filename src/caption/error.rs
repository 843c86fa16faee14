// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error taxonomy for caption requests
//!
//! Every failure a caller can observe maps to one variant here. Messages are
//! safe to return to clients; internal detail (backend errors, provider
//! bodies) is logged where it happens and never carried in the message.

use axum::http::StatusCode;
use thiserror::Error;

use crate::vision::image_utils::ImageError;

/// Errors surfaced by the caption pipeline
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptionError {
    /// Bytes are empty, not a supported format, or fail to decode
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Image exceeds the configured byte limit
    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Unsupported model: {model}")]
    UnsupportedModel { model: String },

    #[error("Unsupported language: {code}")]
    UnsupportedLanguage { code: String },

    /// Weights or tokenizer could not be loaded; not cached, a later request retries
    #[error("Failed to load model {model}")]
    ModelLoad { model: String },

    #[error("Caption generation failed: {0}")]
    Inference(String),

    /// Overall request deadline elapsed
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Internal error")]
    Internal,
}

impl CaptionError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            CaptionError::InvalidImage(_)
            | CaptionError::UnsupportedModel { .. }
            | CaptionError::UnsupportedLanguage { .. } => StatusCode::BAD_REQUEST,
            CaptionError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CaptionError::ModelLoad { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CaptionError::Inference(_) | CaptionError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CaptionError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            CaptionError::InvalidImage(_) => "INVALID_IMAGE",
            CaptionError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            CaptionError::UnsupportedModel { .. } => "UNSUPPORTED_MODEL",
            CaptionError::UnsupportedLanguage { .. } => "UNSUPPORTED_LANGUAGE",
            CaptionError::ModelLoad { .. } => "MODEL_LOAD_FAILED",
            CaptionError::Inference(_) => "INFERENCE_FAILED",
            CaptionError::Timeout { .. } => "TIMEOUT",
            CaptionError::Internal => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller can fix the request and resend
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl From<ImageError> for CaptionError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::TooLarge(size, max) => CaptionError::PayloadTooLarge { size, max },
            other => CaptionError::InvalidImage(other.to_string()),
        }
    }
}
