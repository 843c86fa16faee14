// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Validated caption request

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::CaptionError;
use crate::translation::languages::{find_language, Language};
use crate::vision::backend::{DecodeParams, ModelKey};

/// One caption request, validated once at ingress and immutable afterwards
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    id: Uuid,
    image_bytes: Bytes,
    model_key: ModelKey,
    target_language: Option<&'static Language>,
    decode_params: DecodeParams,
    received_at: DateTime<Utc>,
}

/// Map an optional model name to a key
///
/// Missing, empty and `primary` select `default_key`.
pub fn parse_model_name(name: Option<&str>, default_key: ModelKey) -> Result<ModelKey, CaptionError> {
    match name.map(str::trim) {
        None | Some("") => Ok(default_key),
        Some(alias) if alias.eq_ignore_ascii_case("primary") => Ok(default_key),
        Some(other) => other.parse(),
    }
}

impl CaptionRequest {
    /// Validate client input
    ///
    /// The model is checked first so an unknown model is reported before
    /// any image work, then the target language. An empty language means
    /// no translation.
    pub fn new(
        image_bytes: Bytes,
        model: Option<&str>,
        language: Option<&str>,
        default_key: ModelKey,
    ) -> Result<Self, CaptionError> {
        let model_key = parse_model_name(model, default_key)?;

        let target_language = match language.map(str::trim) {
            None | Some("") => None,
            Some(code) => Some(find_language(code).ok_or_else(|| {
                CaptionError::UnsupportedLanguage {
                    code: code.to_string(),
                }
            })?),
        };

        Ok(Self {
            id: Uuid::new_v4(),
            image_bytes,
            model_key,
            target_language,
            decode_params: model_key.default_decode_params(),
            received_at: Utc::now(),
        })
    }

    /// Override beam width and length cap, clamped to safe bounds
    pub fn with_decode_overrides(mut self, num_beams: Option<usize>, max_length: Option<usize>) -> Self {
        self.decode_params = self.decode_params.with_overrides(num_beams, max_length);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn image_bytes(&self) -> &Bytes {
        &self.image_bytes
    }

    pub fn model_key(&self) -> ModelKey {
        self.model_key
    }

    pub fn target_language(&self) -> Option<&'static Language> {
        self.target_language
    }

    pub fn decode_params(&self) -> DecodeParams {
        self.decode_params
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}
