// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption translation
//!
//! Translates generated captions into one of the supported target languages.
//!
//! Key features:
//! - Fixed, ordered table of supported languages
//! - LRU cache keyed by caption text and target
//! - Provider rate limiting
//! - Graceful degradation on provider failures

pub mod cache;
pub mod config;
pub mod google;
pub mod languages;
pub mod provider;
pub mod rate_limiter;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::TranslationConfig;
pub use languages::{find_language, Language, SUPPORTED_LANGUAGES};
pub use provider::TranslationProvider;
pub use service::TranslationService;
pub use types::{TranslationError, TranslationOutcome};
