// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Translation service orchestration
//!
//! Validates the target, consults the cache, applies the rate limit, then
//! calls the provider with a bounded timeout and at most one retry. Any
//! provider failure becomes a degraded outcome; only an unsupported target
//! is returned as an error.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::cache::{CacheStats, TranslationCache};
use super::config::TranslationConfig;
use super::google::GoogleTranslateProvider;
use super::languages::{find_language, Language, SOURCE_LANGUAGE, SUPPORTED_LANGUAGES};
use super::provider::TranslationProvider;
use super::rate_limiter::TranslationRateLimiter;
use super::types::{TranslationError, TranslationOutcome};

/// Retries after the first attempt, transient failures only
pub const MAX_RETRIES: usize = 1;

/// Translates captions with caching and graceful degradation
pub struct TranslationService {
    provider: Arc<dyn TranslationProvider>,
    cache: TranslationCache,
    rate_limiter: TranslationRateLimiter,
    config: TranslationConfig,
}

impl TranslationService {
    /// Create a service backed by the configured Google endpoint
    pub fn new(config: TranslationConfig) -> Result<Self, TranslationError> {
        let provider = GoogleTranslateProvider::new(config.endpoint.clone(), config.timeout_ms)?;
        Ok(Self::with_provider(config, Arc::new(provider)))
    }

    /// Create a service around any provider
    pub fn with_provider(config: TranslationConfig, provider: Arc<dyn TranslationProvider>) -> Self {
        debug!("Translation provider {} enabled", provider.name());
        Self {
            cache: TranslationCache::new(config.cache_capacity),
            rate_limiter: TranslationRateLimiter::new(config.rate_limit_per_minute),
            provider,
            config,
        }
    }

    /// Supported targets in display order
    pub fn languages(&self) -> &'static [Language] {
        SUPPORTED_LANGUAGES
    }

    /// Resolve a target code, failing before any network activity
    pub fn validate_language(&self, code: &str) -> Result<&'static Language, TranslationError> {
        find_language(code).ok_or_else(|| TranslationError::UnsupportedLanguage {
            code: code.to_string(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Translate a caption into `code`
    ///
    /// Returns `Err` only for unsupported targets. English targets pass the
    /// caption through without a provider call.
    pub async fn translate(
        &self,
        text: &str,
        code: &str,
    ) -> Result<TranslationOutcome, TranslationError> {
        let language = self.validate_language(code)?;

        if language.code == SOURCE_LANGUAGE {
            debug!("Target is the caption language, skipping translation");
            return Ok(TranslationOutcome::translated(
                text,
                text.to_string(),
                language.code,
                language.name,
                false,
            ));
        }

        if !self.config.enabled {
            debug!("Translation disabled, returning degraded outcome");
            return Ok(TranslationOutcome::degraded(text, language.code, language.name));
        }

        if let Some(cached) = self.cache.get(text, language.code) {
            debug!("Translation cache hit for {}", language.code);
            return Ok(TranslationOutcome::translated(
                text,
                cached,
                language.code,
                language.name,
                true,
            ));
        }

        let start = Instant::now();
        match self.call_with_retry(text, language.code).await {
            Ok(translated) => {
                self.cache.insert(text, language.code, &translated);
                info!(
                    "Translated caption to {} via {} in {}ms",
                    language.code,
                    self.provider.name(),
                    start.elapsed().as_millis()
                );
                Ok(TranslationOutcome::translated(
                    text,
                    translated,
                    language.code,
                    language.name,
                    false,
                ))
            }
            Err(e) => {
                warn!(
                    "Translation provider {} failed for {}: {}, returning untranslated caption",
                    self.provider.name(),
                    language.code,
                    e
                );
                Ok(TranslationOutcome::degraded(text, language.code, language.name))
            }
        }
    }

    async fn call_with_retry(&self, text: &str, code: &str) -> Result<String, TranslationError> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut attempt = 0;

        loop {
            self.rate_limiter.check()?;

            let result = match tokio::time::timeout(
                timeout,
                self.provider.translate(text, "auto", code),
            )
            .await
            {
                Ok(inner) => inner,
                Err(_) => Err(TranslationError::Timeout {
                    timeout_ms: self.config.timeout_ms,
                }),
            };

            match result {
                Ok(translated) if !translated.trim().is_empty() => return Ok(translated),
                Ok(_) => {
                    return Err(TranslationError::InvalidResponse(
                        "empty translation".to_string(),
                    ))
                }
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    debug!("Transient translation failure ({}), retrying", e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Translate several captions into one target
    pub async fn batch_translate(
        &self,
        texts: &[String],
        code: &str,
    ) -> Vec<Result<TranslationOutcome, TranslationError>> {
        let futures: Vec<_> = texts.iter().map(|t| self.translate(t, code)).collect();
        futures::future::join_all(futures).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
