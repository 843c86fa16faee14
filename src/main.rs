// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use clap::Parser;
use fabstir_caption_node::{
    api::{start_server, AppState},
    caption::CaptionPipeline,
    cli::Cli,
    config::NodeConfig,
    translation::TranslationService,
    vision::{ImagePreprocessor, ModelRegistry, ModelSource, OnnxBackendLoader},
};
use std::{env, sync::Arc};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("🚀 Starting Fabstir Caption Node...\n");
    println!("📦 BUILD VERSION: {}", fabstir_caption_node::version::VERSION);
    println!("📅 Build Date: {}", fabstir_caption_node::version::BUILD_DATE);
    println!();

    let mut config = NodeConfig::from_env();
    Cli::parse().apply(&mut config);
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {}", e))?;

    // Model registry
    let source = ModelSource {
        models_dir: config.models.models_dir.clone(),
        cache_dir: config.models.cache_dir.clone(),
        allow_download: config.models.allow_download,
    };
    let loader = Arc::new(OnnxBackendLoader::new(source, config.models.intra_threads));
    let registry = Arc::new(ModelRegistry::new(
        loader,
        config.models.device,
        config.models.default_model,
    ));
    println!(
        "🧠 Model registry ready (default: {}, device: {})",
        config.models.default_model, config.models.device
    );

    // Translation
    let translator = Arc::new(TranslationService::new(config.translation.clone())?);
    if translator.is_enabled() {
        println!(
            "🌐 Translation enabled ({} languages)",
            translator.languages().len()
        );
    } else {
        println!("🌐 Translation disabled, translated captions will be reported as degraded");
    }

    let pipeline = Arc::new(CaptionPipeline::new(
        registry.clone(),
        translator,
        ImagePreprocessor::new(config.max_image_bytes),
        config.request_timeout(),
    ));

    if config.models.preload_default {
        info!("Preloading default model {}", config.models.default_model);
        match registry.resolve(config.models.default_model).await {
            Ok(handle) => println!("✅ Default model {} loaded", handle.model_key()),
            // Not fatal: the first request retries the load
            Err(e) => warn!("Default model preload failed: {}", e),
        }
    }

    let addr = config.server.bind_address();
    let separator = "=".repeat(60);
    println!("\n{}", separator);
    println!("Caption Node Running");
    println!("{}", separator);
    println!("Address:        {}", addr);
    println!("Default Model:  {}", config.models.default_model);
    println!("Device:         {}", config.models.device);
    println!("Max Image Size: {} bytes", config.max_image_bytes);
    println!("\nAPI Endpoints:");
    println!("  Caption:      POST http://localhost:{}/api/caption", config.server.port);
    println!(
        "  Base64:       POST http://localhost:{}/api/caption/base64",
        config.server.port
    );
    println!("  Languages:    http://localhost:{}/api/languages", config.server.port);
    println!("  Models:       http://localhost:{}/api/models", config.server.port);
    println!("  Health:       http://localhost:{}/api/health", config.server.port);
    println!("\nPress Ctrl+C to shutdown...");
    println!("{}\n", separator);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        println!("\n⏹️  Shutting down...");
    };

    start_server(AppState::new(pipeline), &addr, shutdown).await?;

    println!("👋 Goodbye!");
    Ok(())
}
