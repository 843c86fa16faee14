// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption request handling
//!
//! Validation at ingress, the staged request pipeline, and assembly of the
//! final result.

pub mod error;
pub mod pipeline;
pub mod request;
pub mod result;

pub use error::CaptionError;
pub use pipeline::{CaptionPipeline, RequestStage};
pub use request::CaptionRequest;
pub use result::{CaptionResponse, CaptionResult, ErrorBody, ResultAssembler};
