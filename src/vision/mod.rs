// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision side of the caption node
//!
//! This module provides:
//! - Image validation and tensor preparation
//! - The caption backend seam and its ONNX Runtime implementation
//! - A single-flight model registry
//! - Beam-search caption generation

pub mod backend;
pub mod engine;
pub mod image_utils;
pub mod onnx;
pub mod preprocessing;
pub mod registry;

pub use backend::{CaptionBackend, DecodeParams, Device, ModelKey, SpecialTokens};
pub use engine::{GenerationOutput, InferenceEngine};
pub use image_utils::{decode_base64_payload, decode_image_bytes, detect_format, ImageError, ImageInfo};
pub use onnx::{ModelSource, OnnxBackendLoader, OnnxCaptionBackend};
pub use preprocessing::{ImagePreprocessor, PreparedImage, ResizeMode, TargetSpec};
pub use registry::{BackendLoader, ModelHandle, ModelInfo, ModelRegistry};
