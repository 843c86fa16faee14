// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Core types for caption translation

use serde::Serialize;
use thiserror::Error;

/// Result of translating one caption
///
/// A degraded outcome means the provider could not be reached or failed;
/// the caption is still usable untranslated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationOutcome {
    pub source_text: String,
    /// Present only when translation succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    pub target_code: &'static str,
    pub target_name: &'static str,
    pub degraded: bool,
    /// Served from the translation cache
    pub cached: bool,
}

impl TranslationOutcome {
    pub(crate) fn translated(
        source_text: &str,
        translated: String,
        code: &'static str,
        name: &'static str,
        cached: bool,
    ) -> Self {
        Self {
            source_text: source_text.to_string(),
            translated_text: Some(translated),
            target_code: code,
            target_name: name,
            degraded: false,
            cached,
        }
    }

    pub(crate) fn degraded(source_text: &str, code: &'static str, name: &'static str) -> Self {
        Self {
            source_text: source_text.to_string(),
            translated_text: None,
            target_code: code,
            target_name: name,
            degraded: true,
            cached: false,
        }
    }
}

/// Errors that can occur during translation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranslationError {
    /// Target code is not in the supported table
    #[error("Unsupported language: {code}")]
    UnsupportedLanguage { code: String },

    #[error("Translation timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Local outbound quota exhausted; provider 429s arrive as `ApiError`
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Non-success HTTP status from the provider
    #[error("Translation API error: {status}")]
    ApiError { status: u16, message: String },

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl TranslationError {
    /// Whether a single retry may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            TranslationError::Timeout { .. } | TranslationError::Network(_) => true,
            TranslationError::ApiError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
