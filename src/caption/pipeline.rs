// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-request caption orchestration
//!
//! A request moves through
//! `RECEIVED -> VALIDATED -> MODEL_RESOLVED -> INFERRED -> TRANSLATED|SKIPPED -> ASSEMBLED -> DONE`,
//! or to `FAILED` with a typed error. Translation failures never fail the
//! request; they mark the result degraded.
//!
//! The overall deadline is applied to a spawned task. When it elapses the
//! caller gets `Timeout` but model loading and inference already in flight
//! run to completion in the background, so a slow first load still ends up
//! cached.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::CaptionError;
use super::request::CaptionRequest;
use super::result::{CaptionResult, ResultAssembler};
use crate::translation::{TranslationError, TranslationService};
use crate::vision::engine::InferenceEngine;
use crate::vision::preprocessing::ImagePreprocessor;
use crate::vision::registry::ModelRegistry;

/// Lifecycle stage of one caption request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    Validated,
    ModelResolved,
    Inferred,
    Translated,
    TranslationSkipped,
    Assembled,
    Done,
    Failed,
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStage::Received => "RECEIVED",
            RequestStage::Validated => "VALIDATED",
            RequestStage::ModelResolved => "MODEL_RESOLVED",
            RequestStage::Inferred => "INFERRED",
            RequestStage::Translated => "TRANSLATED",
            RequestStage::TranslationSkipped => "SKIPPED",
            RequestStage::Assembled => "ASSEMBLED",
            RequestStage::Done => "DONE",
            RequestStage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

fn log_stage(id: Uuid, stage: RequestStage) {
    info!(request_id = %id, stage = %stage, "caption request stage");
}

/// Wires preprocessing, model resolution, inference and translation together
pub struct CaptionPipeline {
    registry: Arc<ModelRegistry>,
    translator: Arc<TranslationService>,
    preprocessor: ImagePreprocessor,
    engine: InferenceEngine,
    deadline: Duration,
}

impl CaptionPipeline {
    pub fn new(
        registry: Arc<ModelRegistry>,
        translator: Arc<TranslationService>,
        preprocessor: ImagePreprocessor,
        deadline: Duration,
    ) -> Self {
        Self {
            registry,
            translator,
            preprocessor,
            engine: InferenceEngine::new(),
            deadline,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn translator(&self) -> &Arc<TranslationService> {
        &self.translator
    }

    pub fn max_image_bytes(&self) -> usize {
        self.preprocessor.max_bytes()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Caption one request within the overall deadline
    pub async fn caption(self: &Arc<Self>, request: CaptionRequest) -> Result<CaptionResult, CaptionError> {
        let id = request.id();
        let pipeline = Arc::clone(self);
        let work = tokio::spawn(async move { pipeline.run(request).await });

        match tokio::time::timeout(self.deadline, work).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                error!(request_id = %id, "caption task failed: {}", join_err);
                log_stage(id, RequestStage::Failed);
                Err(CaptionError::Internal)
            }
            Err(_) => {
                let timeout_ms = self.deadline.as_millis() as u64;
                warn!(
                    request_id = %id,
                    "deadline of {}ms elapsed, in-flight work continues in background",
                    timeout_ms
                );
                log_stage(id, RequestStage::Failed);
                Err(CaptionError::Timeout { timeout_ms })
            }
        }
    }

    /// Caption several requests concurrently; failures stay per item
    pub async fn caption_batch(
        self: &Arc<Self>,
        requests: Vec<CaptionRequest>,
    ) -> Vec<Result<CaptionResult, CaptionError>> {
        let futures: Vec<_> = requests.into_iter().map(|r| self.caption(r)).collect();
        futures::future::join_all(futures).await
    }

    async fn run(&self, request: CaptionRequest) -> Result<CaptionResult, CaptionError> {
        let id = request.id();
        log_stage(id, RequestStage::Received);

        match self.run_stages(&request).await {
            Ok(result) => {
                log_stage(id, RequestStage::Done);
                let elapsed = Utc::now() - request.received_at();
                info!(
                    request_id = %id,
                    "caption generated with {} in {}ms",
                    result.model_used,
                    elapsed.num_milliseconds()
                );
                Ok(result)
            }
            Err(e) => {
                log_stage(id, RequestStage::Failed);
                if e.is_client_error() {
                    info!(request_id = %id, "caption request rejected: {}", e);
                } else {
                    error!(request_id = %id, "caption request failed: {}", e);
                }
                Err(e)
            }
        }
    }

    async fn run_stages(&self, request: &CaptionRequest) -> Result<CaptionResult, CaptionError> {
        let id = request.id();
        let key = request.model_key();

        // Size first: oversized uploads never reach the decoder or a model
        self.preprocessor.check_size(request.image_bytes().len())?;
        let preprocessor = self.preprocessor.clone();
        let bytes = request.image_bytes().clone();
        let spec = key.target_spec();
        let prepared = tokio::task::spawn_blocking(move || preprocessor.prepare(&bytes, &spec))
            .await
            .map_err(|e| {
                error!(request_id = %id, "preprocessing task failed: {}", e);
                CaptionError::Internal
            })??;
        log_stage(id, RequestStage::Validated);

        let handle = self.registry.resolve(key).await?;
        log_stage(id, RequestStage::ModelResolved);

        let output = self
            .engine
            .generate(handle, prepared, request.decode_params())
            .await?;
        log_stage(id, RequestStage::Inferred);

        let translation = match request.target_language() {
            Some(language) => {
                let outcome = self
                    .translator
                    .translate(&output.text, language.code)
                    .await
                    .map_err(|e| match e {
                        TranslationError::UnsupportedLanguage { code } => {
                            CaptionError::UnsupportedLanguage { code }
                        }
                        _ => CaptionError::Internal,
                    })?;
                if outcome.degraded {
                    warn!(request_id = %id, "translation to {} degraded", language.code);
                }
                log_stage(id, RequestStage::Translated);
                Some(outcome)
            }
            None => {
                log_stage(id, RequestStage::TranslationSkipped);
                None
            }
        };

        let result = ResultAssembler::assemble(&output, translation.as_ref(), key);
        log_stage(id, RequestStage::Assembled);
        Ok(result)
    }
}
