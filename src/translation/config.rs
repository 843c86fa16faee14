// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for caption translation

use std::env;

use super::cache::DEFAULT_CACHE_CAPACITY;
use super::google::GOOGLE_TRANSLATE_URL;

/// Configuration for caption translation
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationConfig {
    /// When false every translation request degrades without a provider call
    pub enabled: bool,
    /// Provider endpoint URL
    pub endpoint: String,
    /// Timeout for a single provider attempt
    pub timeout_ms: u64,
    /// Maximum cached translations
    pub cache_capacity: usize,
    /// Outbound requests per minute
    pub rate_limit_per_minute: u32,
}

impl TranslationConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env::var("TRANSLATION_ENABLED")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(defaults.enabled),
            endpoint: env::var("TRANSLATION_ENDPOINT").unwrap_or(defaults.endpoint),
            timeout_ms: env::var("TRANSLATION_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_ms),
            cache_capacity: env::var("TRANSLATION_CACHE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_capacity),
            rate_limit_per_minute: env::var("TRANSLATION_RATE_LIMIT_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit_per_minute),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("Translation timeout must be greater than 0".to_string());
        }
        if self.cache_capacity == 0 {
            return Err("Translation cache size must be greater than 0".to_string());
        }
        if self.rate_limit_per_minute == 0 {
            return Err("Translation rate limit must be greater than 0".to_string());
        }
        if self.enabled && !self.endpoint.starts_with("http") {
            return Err(format!("Invalid translation endpoint: {}", self.endpoint));
        }
        Ok(())
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: GOOGLE_TRANSLATE_URL.to_string(),
            timeout_ms: 5000,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            rate_limit_per_minute: 120,
        }
    }
}
