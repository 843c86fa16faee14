// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Command-line flags layered over the environment configuration

use clap::Parser;
use std::path::PathBuf;

use crate::config::NodeConfig;
use crate::vision::backend::{Device, ModelKey};

/// Fabstir Caption Node
#[derive(Parser, Debug, Default)]
#[command(name = "fabstir-caption-node")]
#[command(version)]
#[command(about = "Image captioning and caption translation service", long_about = None)]
pub struct Cli {
    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Default caption model (blip or git)
    #[arg(long, value_parser = parse_model)]
    pub default_model: Option<ModelKey>,

    /// Compute device (cpu, cuda, cuda:N)
    #[arg(long, value_parser = parse_device)]
    pub device: Option<Device>,

    /// Local model directory
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// Never download models from the hub
    #[arg(long)]
    pub offline: bool,

    /// Load the default model at startup
    #[arg(long)]
    pub preload: bool,

    /// Disable caption translation
    #[arg(long)]
    pub no_translation: bool,
}

fn parse_model(s: &str) -> Result<ModelKey, String> {
    s.parse::<ModelKey>().map_err(|e| e.to_string())
}

fn parse_device(s: &str) -> Result<Device, String> {
    s.parse::<Device>()
}

impl Cli {
    /// Apply flags on top of `config`; unset flags leave values untouched
    pub fn apply(self, config: &mut NodeConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(model) = self.default_model {
            config.models.default_model = model;
        }
        if let Some(device) = self.device {
            config.models.device = device;
        }
        if let Some(dir) = self.models_dir {
            config.models.models_dir = dir;
        }
        if self.offline {
            config.models.allow_download = false;
        }
        if self.preload {
            config.models.preload_default = true;
        }
        if self.no_translation {
            config.translation.enabled = false;
        }
    }
}
