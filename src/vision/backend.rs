// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption model identities and the backend seam
//!
//! [`ModelKey`] is the closed set of captioning models this node can serve.
//! Each key carries everything needed to load and drive it: hub repository,
//! file names, input contract and default decoding parameters.
//! [`CaptionBackend`] is what a loaded model looks like to the inference
//! engine; the ONNX implementation lives in `onnx.rs` and tests plug in
//! scripted doubles.

use anyhow::Result;
use ndarray::{Array2, Array4};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::preprocessing::{ResizeMode, TargetSpec};
use crate::caption::error::CaptionError;

/// Lower bound on beam width
pub const MIN_BEAMS: usize = 1;
/// Upper bound on beam width
pub const MAX_BEAMS: usize = 8;
/// Lower bound on generated tokens
pub const MIN_LENGTH_CAP: usize = 5;
/// Upper bound on generated tokens
pub const MAX_LENGTH_CAP: usize = 128;

/// Supported captioning models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKey {
    /// Salesforce BLIP large
    Blip,
    /// Microsoft GIT base fine-tuned on COCO
    Git,
}

impl ModelKey {
    /// Every supported key, in listing order
    pub const ALL: [ModelKey; 2] = [ModelKey::Blip, ModelKey::Git];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKey::Blip => "blip",
            ModelKey::Git => "git",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKey::Blip => "BLIP (Salesforce)",
            ModelKey::Git => "GIT (Microsoft)",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModelKey::Blip => "Bootstrapped language-image pre-training, strong general captions",
            ModelKey::Git => "Generative image-to-text transformer, concise COCO-style captions",
        }
    }

    /// Upstream model the ONNX export was produced from
    pub fn source_model(&self) -> &'static str {
        match self {
            ModelKey::Blip => "Salesforce/blip-image-captioning-large",
            ModelKey::Git => "microsoft/git-base-coco",
        }
    }

    /// Hub repository holding the ONNX export
    pub fn hub_repo(&self) -> &'static str {
        match self {
            ModelKey::Blip => "Xenova/blip-image-captioning-large",
            ModelKey::Git => "Xenova/git-base-coco",
        }
    }

    /// Candidate vision encoder file names, in preference order
    pub fn encoder_files(&self) -> &'static [&'static str] {
        &[
            "onnx/vision_model.onnx",
            "vision_model.onnx",
            "onnx/encoder_model.onnx",
            "encoder_model.onnx",
        ]
    }

    /// Candidate text decoder file names, in preference order
    pub fn decoder_files(&self) -> &'static [&'static str] {
        &[
            "onnx/text_decoder_model.onnx",
            "text_decoder_model.onnx",
            "onnx/decoder_model.onnx",
            "decoder_model.onnx",
        ]
    }

    pub fn tokenizer_file(&self) -> &'static str {
        "tokenizer.json"
    }

    /// Input contract for the vision encoder
    pub fn target_spec(&self) -> TargetSpec {
        match self {
            ModelKey::Blip => TargetSpec::new(384, ResizeMode::Stretch),
            ModelKey::Git => TargetSpec::new(224, ResizeMode::CenterCrop),
        }
    }

    pub fn default_decode_params(&self) -> DecodeParams {
        DecodeParams::default()
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKey {
    type Err = CaptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "blip" => Ok(ModelKey::Blip),
            "git" => Ok(ModelKey::Git),
            _ => Err(CaptionError::UnsupportedModel {
                model: s.to_string(),
            }),
        }
    }
}

/// Compute device a model is placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    /// CUDA device ordinal
    Cuda(i32),
}

impl Device {
    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(0) => f.write_str("cuda"),
            Device::Cuda(id) => write!(f, "cuda:{}", id),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            other => match other.strip_prefix("cuda:") {
                Some(id) => id
                    .parse::<i32>()
                    .ok()
                    .filter(|id| *id >= 0)
                    .map(Device::Cuda)
                    .ok_or_else(|| format!("Invalid CUDA device ordinal: {}", id)),
                None => Err(format!("Unknown device: {}", s)),
            },
        }
    }
}

/// Beam search parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodeParams {
    pub num_beams: usize,
    /// Maximum generated tokens, excluding the start token
    pub max_length: usize,
    /// End-of-sequence is suppressed until this many tokens exist
    pub min_length: usize,
    /// Exponent applied to hypothesis length when ranking finished beams
    pub length_penalty: f32,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            num_beams: 5,
            max_length: 50,
            min_length: 1,
            length_penalty: 1.0,
        }
    }
}

impl DecodeParams {
    /// Apply caller overrides, clamped to safe bounds
    pub fn with_overrides(mut self, num_beams: Option<usize>, max_length: Option<usize>) -> Self {
        if let Some(beams) = num_beams {
            self.num_beams = beams.clamp(MIN_BEAMS, MAX_BEAMS);
        }
        if let Some(len) = max_length {
            self.max_length = len.clamp(MIN_LENGTH_CAP, MAX_LENGTH_CAP);
        }
        self.min_length = self.min_length.min(self.max_length);
        self
    }
}

/// Token ids the decoder loop needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    /// First token fed to the decoder
    pub bos: u32,
    /// Terminates a hypothesis
    pub eos: u32,
    pub pad: u32,
}

/// A loaded captioning model
///
/// Implementations hold weights, tokenizer and device placement. Methods are
/// synchronous and may block; the engine calls them from the blocking pool.
pub trait CaptionBackend: Send + Sync {
    /// Run the vision encoder once: `[1, 3, H, W]` -> `[seq_len, hidden]`
    fn encode(&self, pixels: &Array4<f32>) -> Result<Array2<f32>>;

    /// Logits over the vocabulary for the token following `tokens`
    fn next_token_logits(&self, image_states: &Array2<f32>, tokens: &[u32]) -> Result<Vec<f32>>;

    /// Logits for several hypotheses sharing the same image
    fn next_token_logits_batch(
        &self,
        image_states: &Array2<f32>,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<Vec<f32>>> {
        sequences
            .iter()
            .map(|tokens| self.next_token_logits(image_states, tokens))
            .collect()
    }

    fn special_tokens(&self) -> SpecialTokens;

    /// Detokenize, skipping special tokens
    fn decode_text(&self, tokens: &[u32]) -> Result<String>;

    /// False when concurrent calls must be serialized (GPU-resident state)
    fn is_reentrant(&self) -> bool {
        true
    }

    /// Device the weights actually landed on; `None` means the requested one
    fn placement(&self) -> Option<Device> {
        None
    }
}
