// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption results and their wire format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::CaptionError;
use crate::translation::types::TranslationOutcome;
use crate::vision::backend::ModelKey;
use crate::vision::engine::GenerationOutput;

/// Final outcome of a successful caption request
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionResult {
    pub caption: String,
    /// Fluency proxy in `[0, 1]`, not a calibrated accuracy estimate
    pub confidence: f32,
    pub model_used: ModelKey,
    pub translated_caption: Option<String>,
    /// Set whenever translation was requested
    pub target_language_code: Option<&'static str>,
    pub target_language_name: Option<&'static str>,
    pub translation_degraded: bool,
    pub timestamp: DateTime<Utc>,
}

impl CaptionResult {
    pub fn translation_requested(&self) -> bool {
        self.target_language_code.is_some()
    }
}

/// Composes a [`CaptionResult`]; pure, no I/O
pub struct ResultAssembler;

impl ResultAssembler {
    /// Assemble with the current time
    pub fn assemble(
        output: &GenerationOutput,
        translation: Option<&TranslationOutcome>,
        model: ModelKey,
    ) -> CaptionResult {
        Self::assemble_at(output, translation, model, Utc::now())
    }

    /// Assemble with an explicit timestamp
    pub fn assemble_at(
        output: &GenerationOutput,
        translation: Option<&TranslationOutcome>,
        model: ModelKey,
        timestamp: DateTime<Utc>,
    ) -> CaptionResult {
        CaptionResult {
            caption: output.text.clone(),
            confidence: round_confidence(output.confidence()),
            model_used: model,
            translated_caption: translation.and_then(|t| t.translated_text.clone()),
            target_language_code: translation.map(|t| t.target_code),
            target_language_name: translation.map(|t| t.target_name),
            translation_degraded: translation.map(|t| t.degraded).unwrap_or(false),
            timestamp,
        }
    }
}

/// Four decimal places keep the JSON readable and stay inside `[0, 1]`
fn round_confidence(value: f32) -> f32 {
    ((value * 10_000.0).round() / 10_000.0).clamp(0.0, 1.0)
}

/// Success body returned to clients
///
/// Optional fields are omitted rather than null so the layout only varies
/// by which translation fields apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptionResponse {
    pub success: bool,
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_caption: Option<String>,
    pub confidence: f32,
    pub model_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_name: Option<String>,
    /// Present only when translation was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation_degraded: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

impl From<CaptionResult> for CaptionResponse {
    fn from(result: CaptionResult) -> Self {
        let requested = result.translation_requested();
        Self {
            success: true,
            caption: result.caption,
            translated_caption: result.translated_caption,
            confidence: result.confidence,
            model_used: result.model_used.to_string(),
            language: result.target_language_code.map(str::to_string),
            language_name: result.target_language_name.map(str::to_string),
            translation_degraded: requested.then_some(result.translation_degraded),
            timestamp: result.timestamp,
        }
    }
}

/// Failure body returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub error_code: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_code: error_code.into(),
        }
    }
}

impl From<&CaptionError> for ErrorBody {
    fn from(err: &CaptionError) -> Self {
        Self::new(err.to_string(), err.error_code())
    }
}
