// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Shared test doubles for caption integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use fabstir_caption_node::caption::CaptionPipeline;
use fabstir_caption_node::translation::{
    TranslationConfig, TranslationError, TranslationProvider, TranslationService,
};
use fabstir_caption_node::vision::{
    BackendLoader, CaptionBackend, Device, ImagePreprocessor, ModelKey, ModelRegistry,
    SpecialTokens,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::{Array2, Array4};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const PAD: u32 = 0;
pub const BOS: u32 = 1;
pub const EOS: u32 = 2;
pub const VOCAB: [&str; 7] = ["<pad>", "<bos>", "<eos>", "a", "dog", "in", "park"];

/// Token ids of "a dog in a park"
pub const DOG_IN_PARK: [u32; 5] = [3, 4, 5, 3, 6];

/// Decoder that follows a fixed token script by position
pub struct ScriptedBackend {
    script: Vec<u32>,
    placement: Option<Device>,
}

impl ScriptedBackend {
    pub fn dog_in_park() -> Self {
        Self {
            script: DOG_IN_PARK.to_vec(),
            placement: None,
        }
    }
}

impl CaptionBackend for ScriptedBackend {
    fn encode(&self, pixels: &Array4<f32>) -> anyhow::Result<Array2<f32>> {
        anyhow::ensure!(pixels.shape()[0] == 1, "expected a single image");
        Ok(Array2::zeros((4, 8)))
    }

    fn next_token_logits(&self, _states: &Array2<f32>, tokens: &[u32]) -> anyhow::Result<Vec<f32>> {
        // tokens start with BOS, so the position is one less than the length
        let position = tokens.len().saturating_sub(1);
        let mut logits = vec![0.0; VOCAB.len()];
        logits[EOS as usize] = -8.0;
        match self.script.get(position) {
            Some(&token) => logits[token as usize] = 8.0,
            None => logits[EOS as usize] = 8.0,
        }
        Ok(logits)
    }

    fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens {
            bos: BOS,
            eos: EOS,
            pad: PAD,
        }
    }

    fn decode_text(&self, tokens: &[u32]) -> anyhow::Result<String> {
        Ok(tokens
            .iter()
            .filter_map(|&t| VOCAB.get(t as usize))
            .copied()
            .collect::<Vec<_>>()
            .join(" "))
    }

    fn placement(&self) -> Option<Device> {
        self.placement
    }
}

/// Loader that counts calls, optionally sleeping and failing the first attempts
pub struct CountingLoader {
    loads: AtomicUsize,
    failures: usize,
    delay: Duration,
    placement: Option<Device>,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self::with(0, Duration::ZERO)
    }

    pub fn with(failures: usize, delay: Duration) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            failures,
            delay,
            placement: None,
        }
    }

    /// Backends report `device` as their placement whatever was requested
    pub fn placed_on(device: Device) -> Self {
        Self {
            placement: Some(device),
            ..Self::new()
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendLoader for CountingLoader {
    async fn load(&self, _key: ModelKey, _device: Device) -> anyhow::Result<Arc<dyn CaptionBackend>> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if attempt < self.failures {
            anyhow::bail!("weights not found");
        }
        Ok(Arc::new(ScriptedBackend {
            placement: self.placement,
            ..ScriptedBackend::dog_in_park()
        }))
    }
}

/// Provider with a small fixed dictionary that counts calls
pub struct DictionaryProvider {
    calls: AtomicUsize,
}

impl DictionaryProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for DictionaryProvider {
    async fn translate(&self, text: &str, _source: &str, target: &str) -> Result<String, TranslationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let translated = match (text, target) {
            ("a dog in a park", "fr") => "un chien dans un parc".to_string(),
            ("a dog in a park", "es") => "un perro en un parque".to_string(),
            _ => format!("[{}] {}", target, text),
        };
        Ok(translated)
    }

    fn name(&self) -> &'static str {
        "dictionary"
    }
}

/// Provider that fails every attempt with a transient error
pub struct FailingProvider {
    calls: AtomicUsize,
}

impl FailingProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for FailingProvider {
    async fn translate(&self, _text: &str, _source: &str, _target: &str) -> Result<String, TranslationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TranslationError::ApiError {
            status: 503,
            message: "service unavailable".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

pub fn translation_config() -> TranslationConfig {
    TranslationConfig {
        timeout_ms: 500,
        rate_limit_per_minute: 10_000,
        ..TranslationConfig::default()
    }
}

pub fn translator(provider: Arc<dyn TranslationProvider>) -> Arc<TranslationService> {
    Arc::new(TranslationService::with_provider(translation_config(), provider))
}

/// Everything a pipeline test needs to make assertions
pub struct Harness {
    pub pipeline: Arc<CaptionPipeline>,
    pub loader: Arc<CountingLoader>,
    pub registry: Arc<ModelRegistry>,
}

pub fn harness_with(
    loader: CountingLoader,
    provider: Arc<dyn TranslationProvider>,
    deadline: Duration,
) -> Harness {
    harness_on(Device::Cpu, loader, provider, deadline)
}

pub fn harness_on(
    device: Device,
    loader: CountingLoader,
    provider: Arc<dyn TranslationProvider>,
    deadline: Duration,
) -> Harness {
    let loader = Arc::new(loader);
    let registry = Arc::new(ModelRegistry::new(loader.clone(), device, ModelKey::Blip));
    let pipeline = Arc::new(CaptionPipeline::new(
        registry.clone(),
        translator(provider),
        ImagePreprocessor::default(),
        deadline,
    ));
    Harness {
        pipeline,
        loader,
        registry,
    }
}

pub fn harness() -> Harness {
    harness_with(
        CountingLoader::new(),
        Arc::new(DictionaryProvider::new()),
        Duration::from_secs(30),
    )
}

fn encode(format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, format)
        .expect("encode fixture");
    buf.into_inner()
}

pub fn jpeg_bytes() -> Vec<u8> {
    encode(ImageFormat::Jpeg)
}

pub fn png_bytes() -> Vec<u8> {
    encode(ImageFormat::Png)
}

/// JPEG magic followed by padding, `len` bytes total
pub fn oversized_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    bytes[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    bytes
}
