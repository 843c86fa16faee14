// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Process-lifetime cache of loaded caption models
//!
//! Each [`ModelKey`] owns one slot created at startup. The first `resolve`
//! for a key loads the backend; concurrent callers for the same key wait on
//! the same slot and receive the same handle. A failed load leaves the slot
//! empty so a later request tries again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::backend::{CaptionBackend, Device, ModelKey};
use crate::caption::error::CaptionError;
use crate::caption::request::parse_model_name;

/// Produces a backend for a model key
#[async_trait]
pub trait BackendLoader: Send + Sync {
    async fn load(&self, key: ModelKey, device: Device) -> anyhow::Result<Arc<dyn CaptionBackend>>;
}

/// A loaded model shared by every request that uses it
pub struct ModelHandle {
    model_key: ModelKey,
    device: Device,
    load_timestamp: DateTime<Utc>,
    backend: Arc<dyn CaptionBackend>,
    /// Held for the whole generation when the backend is not reentrant
    inference_lock: Mutex<()>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_key", &self.model_key)
            .field("device", &self.device)
            .field("load_timestamp", &self.load_timestamp)
            .field("reentrant", &self.backend.is_reentrant())
            .finish_non_exhaustive()
    }
}

impl ModelHandle {
    pub fn new(model_key: ModelKey, device: Device, backend: Arc<dyn CaptionBackend>) -> Self {
        Self {
            model_key,
            device,
            load_timestamp: Utc::now(),
            backend,
            inference_lock: Mutex::new(()),
        }
    }

    pub fn model_key(&self) -> ModelKey {
        self.model_key
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn load_timestamp(&self) -> DateTime<Utc> {
        self.load_timestamp
    }

    /// Run `f` against the backend, serialized when it is not reentrant
    ///
    /// A panic inside `f` poisons the lock; the next caller recovers it, so
    /// one failed generation never makes the handle unusable.
    pub fn with_backend<T>(&self, f: impl FnOnce(&dyn CaptionBackend) -> T) -> T {
        if self.backend.is_reentrant() {
            return f(self.backend.as_ref());
        }
        let _guard = self
            .inference_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(self.backend.as_ref())
    }
}

/// Listing entry for a supported model
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelInfo {
    pub name: ModelKey,
    pub display_name: &'static str,
    pub description: &'static str,
    pub source_model: &'static str,
    pub loaded: bool,
    pub is_default: bool,
}

/// Owns every loaded model for the life of the process
pub struct ModelRegistry {
    slots: HashMap<ModelKey, OnceCell<Arc<ModelHandle>>>,
    loader: Arc<dyn BackendLoader>,
    device: Device,
    default_key: ModelKey,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("device", &self.device)
            .field("default_key", &self.default_key)
            .field("loaded", &self.loaded_count())
            .finish_non_exhaustive()
    }
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn BackendLoader>, device: Device, default_key: ModelKey) -> Self {
        let slots = ModelKey::ALL
            .iter()
            .map(|key| (*key, OnceCell::new()))
            .collect();

        Self {
            slots,
            loader,
            device,
            default_key,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Model used when a request does not name one
    pub fn default_key(&self) -> ModelKey {
        self.default_key
    }

    /// Get the handle for `key`, loading it on first use
    pub async fn resolve(&self, key: ModelKey) -> Result<Arc<ModelHandle>, CaptionError> {
        let slot = self
            .slots
            .get(&key)
            .ok_or_else(|| CaptionError::UnsupportedModel {
                model: key.to_string(),
            })?;

        if let Some(handle) = slot.get() {
            debug!("Model {} already loaded", key);
            return Ok(Arc::clone(handle));
        }

        let handle = slot
            .get_or_try_init(|| self.load_handle(key))
            .await?;
        Ok(Arc::clone(handle))
    }

    /// Parse a key string (including the `primary` alias) and resolve it
    pub async fn resolve_name(&self, name: Option<&str>) -> Result<Arc<ModelHandle>, CaptionError> {
        let key = self.parse_key(name)?;
        self.resolve(key).await
    }

    /// Map an optional client-supplied name to a key
    ///
    /// Empty, missing and `primary` select the default model.
    pub fn parse_key(&self, name: Option<&str>) -> Result<ModelKey, CaptionError> {
        parse_model_name(name, self.default_key)
    }

    async fn load_handle(&self, key: ModelKey) -> Result<Arc<ModelHandle>, CaptionError> {
        info!("Loading caption model {} on {}", key, self.device);
        let start = Instant::now();

        match self.loader.load(key, self.device).await {
            Ok(backend) => {
                let device = backend.placement().unwrap_or(self.device);
                if device != self.device {
                    warn!(
                        "Caption model {} requested on {} but runs on {}",
                        key, self.device, device
                    );
                }
                info!(
                    "✅ Caption model {} loaded in {}ms on {} (reentrant: {})",
                    key,
                    start.elapsed().as_millis(),
                    device,
                    backend.is_reentrant()
                );
                Ok(Arc::new(ModelHandle::new(key, device, backend)))
            }
            Err(e) => {
                warn!("Failed to load caption model {}: {:#}", key, e);
                Err(CaptionError::ModelLoad {
                    model: key.to_string(),
                })
            }
        }
    }

    pub fn is_loaded(&self, key: ModelKey) -> bool {
        self.slots
            .get(&key)
            .map(|slot| slot.initialized())
            .unwrap_or(false)
    }

    /// Device a loaded model actually runs on
    pub fn loaded_device(&self, key: ModelKey) -> Option<Device> {
        self.slots
            .get(&key)
            .and_then(|slot| slot.get())
            .map(|handle| handle.device())
    }

    pub fn loaded_count(&self) -> usize {
        self.slots.values().filter(|slot| slot.initialized()).count()
    }

    /// Keys of models currently in memory
    pub fn loaded_models(&self) -> Vec<ModelKey> {
        ModelKey::ALL
            .iter()
            .copied()
            .filter(|key| self.is_loaded(*key))
            .collect()
    }

    /// Every supported model with display metadata
    pub fn list_models(&self) -> Vec<ModelInfo> {
        ModelKey::ALL
            .iter()
            .map(|key| ModelInfo {
                name: *key,
                display_name: key.display_name(),
                description: key.description(),
                source_model: key.source_model(),
                loaded: self.is_loaded(*key),
                is_default: *key == self.default_key,
            })
            .collect()
    }
}
