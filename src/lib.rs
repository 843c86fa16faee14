// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod caption;
pub mod cli;
pub mod config;
pub mod translation;
pub mod version;
pub mod vision;

// Re-export main types
pub use caption::{CaptionError, CaptionPipeline, CaptionRequest, CaptionResponse, CaptionResult};
pub use config::NodeConfig;
pub use translation::{TranslationConfig, TranslationOutcome, TranslationService};
pub use vision::{Device, ModelKey, ModelRegistry};

/// Result type for caption operations
pub type Result<T> = std::result::Result<T, CaptionError>;
