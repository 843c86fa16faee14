// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP surface over the caption pipeline

pub mod errors;
pub mod handlers;
pub mod server;

pub use errors::ApiError;
pub use handlers::{Base64CaptionRequest, HealthResponse, LanguagesResponse, ModelsResponse};
pub use server::{create_router, start_server, AppState};
