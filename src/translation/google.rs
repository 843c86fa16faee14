// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Google Translate web endpoint provider
//!
//! Uses the keyless `translate_a/single` endpoint. The response is a nested
//! JSON array whose first element lists translated segments.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::provider::TranslationProvider;
use super::types::TranslationError;

/// Default endpoint for keyless translation
pub const GOOGLE_TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";

/// Google Translate provider
pub struct GoogleTranslateProvider {
    endpoint: String,
    client: Client,
    timeout_ms: u64,
}

impl GoogleTranslateProvider {
    /// Create a provider against `endpoint`
    ///
    /// # Arguments
    /// * `endpoint` - Full URL of the `translate_a/single` endpoint
    /// * `timeout_ms` - HTTP client timeout per request
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> Result<Self, TranslationError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| TranslationError::Network(format!("HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
            timeout_ms,
        })
    }
}

#[async_trait]
impl TranslationProvider for GoogleTranslateProvider {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranslationError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    TranslationError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        // 429 stays an ApiError so the service retries it like a 5xx
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TranslationError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TranslationError::InvalidResponse(format!("JSON parse error: {}", e)))?;

        parse_segments(&body)
    }

    fn name(&self) -> &'static str {
        "google"
    }
}

/// Join the translated segments of a `translate_a/single` response
pub fn parse_segments(body: &serde_json::Value) -> Result<String, TranslationError> {
    let segments = body
        .get(0)
        .and_then(|v| v.as_array())
        .ok_or_else(|| TranslationError::InvalidResponse("missing segment list".to_string()))?;

    let text: String = segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(|s| s.as_str()))
        .collect();

    let text = text.trim();
    if text.is_empty() {
        return Err(TranslationError::InvalidResponse(
            "empty translation".to_string(),
        ));
    }
    Ok(text.to_string())
}
