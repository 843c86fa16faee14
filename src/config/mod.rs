// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration
//!
//! Loaded from the environment (after `.env` is read in `main`) and then
//! overridden by command-line flags.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::translation::TranslationConfig;
use crate::vision::backend::{Device, ModelKey};
use crate::vision::image_utils::DEFAULT_MAX_IMAGE_BYTES;

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Caption model settings
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Backend used when a request names none or says `primary`
    pub default_model: ModelKey,
    pub device: Device,
    /// Local model root, one sub-directory per model
    pub models_dir: PathBuf,
    /// Hub download cache
    pub cache_dir: Option<PathBuf>,
    pub allow_download: bool,
    /// Load the default model before accepting requests
    pub preload_default: bool,
    /// ONNX Runtime intra-op threads for CPU sessions
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_model: ModelKey::Blip,
            device: Device::Cpu,
            models_dir: PathBuf::from("./models"),
            cache_dir: None,
            allow_download: true,
            preload_default: false,
            intra_threads: 4,
        }
    }
}

/// Complete node configuration
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub server: ServerConfig,
    pub models: ModelConfig,
    /// Largest accepted image upload in bytes
    pub max_image_bytes: usize,
    /// Overall deadline for one caption request
    pub request_timeout_secs: u64,
    pub translation: TranslationConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            models: ModelConfig::default(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            request_timeout_secs: 60,
            translation: TranslationConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

impl NodeConfig {
    /// Load configuration from environment variables
    ///
    /// Unparseable values fall back to defaults; `validate` catches the rest.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let server = ServerConfig {
            host: env::var("HOST").unwrap_or(defaults.server.host),
            port: env_parse("PORT").unwrap_or(defaults.server.port),
        };

        let models = ModelConfig {
            default_model: env_parse("DEFAULT_MODEL").unwrap_or(defaults.models.default_model),
            device: env_parse("DEVICE").unwrap_or(defaults.models.device),
            models_dir: env::var("MODELS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.models.models_dir),
            cache_dir: env::var("MODEL_CACHE_DIR").ok().map(PathBuf::from),
            allow_download: env_flag("ALLOW_MODEL_DOWNLOAD", defaults.models.allow_download),
            preload_default: env_flag("PRELOAD_DEFAULT_MODEL", defaults.models.preload_default),
            intra_threads: env_parse("ONNX_INTRA_THREADS").unwrap_or(defaults.models.intra_threads),
        };

        Self {
            server,
            models,
            max_image_bytes: env_parse("MAX_CONTENT_LENGTH").unwrap_or(defaults.max_image_bytes),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout_secs),
            translation: TranslationConfig::from_env(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Port must be greater than 0".to_string());
        }
        if self.max_image_bytes == 0 {
            return Err("Maximum image size must be greater than 0".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }
        if self.models.intra_threads == 0 {
            return Err("ONNX intra threads must be greater than 0".to_string());
        }
        self.translation.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
