// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the Fabstir Caption Node

/// Full version string with feature description
pub const VERSION: &str = "v1.0.0-caption-translation-2025-10-19";

/// Semantic version number
pub const VERSION_NUMBER: &str = "1.0.0";

/// Major version number
pub const VERSION_MAJOR: u32 = 1;

/// Minor version number
pub const VERSION_MINOR: u32 = 0;

/// Patch version number
pub const VERSION_PATCH: u32 = 0;

/// Build date
pub const BUILD_DATE: &str = "2025-10-19";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "blip-captioning",
    "git-captioning",
    "beam-search",
    "single-flight-model-loading",
    "caption-translation",
    "translation-cache",
    "multipart-upload",
    "base64-upload",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Fabstir Caption Node {} ({})", VERSION_NUMBER, BUILD_DATE)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "date": BUILD_DATE,
        "features": FEATURES,
    })
}
