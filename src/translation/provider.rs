// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Translation provider trait definition

use async_trait::async_trait;

use super::types::TranslationError;

/// An external machine translation backend
///
/// Implementations make a single attempt; timeouts, retries and caching are
/// applied by the service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Translate `text` from `source` (or `auto`) into `target`
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
