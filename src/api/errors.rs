// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP error mapping
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::multipart::MultipartError;
use std::fmt;
use tracing::debug;

use crate::caption::{CaptionError, ErrorBody};

/// Errors produced by the HTTP layer
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Any pipeline failure, mapped through its own status and code
    Caption(CaptionError),
    /// Malformed form or JSON body
    InvalidRequest(String),
    NotFound(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Caption(e) => e.status_code(),
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Caption(e) => e.error_code(),
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.to_string(), self.error_code())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Caption(e) => write!(f, "{}", e),
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<CaptionError> for ApiError {
    fn from(err: CaptionError) -> Self {
        ApiError::Caption(err)
    }
}

/// Map a multipart read failure, turning a tripped body limit into 413
pub fn multipart_error(err: MultipartError, max_bytes: usize) -> ApiError {
    debug!("multipart error: {}", err);
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::Caption(CaptionError::PayloadTooLarge {
            size: max_bytes + 1,
            max: max_bytes,
        })
    } else {
        ApiError::InvalidRequest(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_body())).into_response()
    }
}

impl IntoResponse for CaptionError {
    fn into_response(self) -> Response {
        ApiError::Caption(self).into_response()
    }
}
