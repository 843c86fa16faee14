// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX Runtime caption backend
//!
//! A caption model is exported as two graphs: a vision encoder producing
//! image hidden states and a text decoder producing next-token logits from
//! `input_ids` plus those states. Files are looked up in the local model
//! directory first and fetched from the Hugging Face hub when allowed.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ndarray::{Array2, Array3, Array4, ArrayViewD, Axis, Ix2};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use super::backend::{CaptionBackend, Device, ModelKey, SpecialTokens};
use super::registry::BackendLoader;

/// Resolved on-disk locations of a model's files
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFiles {
    pub encoder: PathBuf,
    pub decoder: PathBuf,
    pub tokenizer: PathBuf,
}

/// Where model files come from
#[derive(Debug, Clone)]
pub struct ModelSource {
    /// Root holding one sub-directory per model key
    pub models_dir: PathBuf,
    /// Hub download cache; the hub default when `None`
    pub cache_dir: Option<PathBuf>,
    pub allow_download: bool,
}

impl ModelSource {
    /// Local directory for a key, e.g. `models/blip`
    pub fn local_dir(&self, key: ModelKey) -> PathBuf {
        self.models_dir.join(key.as_str())
    }

    /// Find files locally, falling back to a hub download
    pub fn resolve(&self, key: ModelKey) -> Result<ModelFiles> {
        let dir = self.local_dir(key);
        if let Some(files) = find_local_files(&dir, key) {
            debug!("Using local model files for {} in {}", key, dir.display());
            return Ok(files);
        }

        if !self.allow_download {
            anyhow::bail!(
                "Model files for {} not found in {} and downloads are disabled",
                key,
                dir.display()
            );
        }

        info!("Fetching {} from hub repository {}", key, key.hub_repo());
        self.download(key)
    }

    fn download(&self, key: ModelKey) -> Result<ModelFiles> {
        let mut builder = hf_hub::api::sync::ApiBuilder::new().with_progress(false);
        if let Some(cache_dir) = &self.cache_dir {
            builder = builder.with_cache_dir(cache_dir.clone());
        }
        let api = builder.build().context("Failed to create hub client")?;
        let repo = api.model(key.hub_repo().to_string());

        let fetch_first = |candidates: &[&str]| -> Result<PathBuf> {
            let mut last_err = None;
            for name in candidates {
                match repo.get(name) {
                    Ok(path) => return Ok(path),
                    Err(e) => last_err = Some(e),
                }
            }
            Err(match last_err {
                Some(e) => anyhow!("{}: {}", candidates.join(", "), e),
                None => anyhow!("no candidate files"),
            })
        };

        Ok(ModelFiles {
            encoder: fetch_first(key.encoder_files()).context("Failed to fetch vision encoder")?,
            decoder: fetch_first(key.decoder_files()).context("Failed to fetch text decoder")?,
            tokenizer: fetch_first(&[key.tokenizer_file()]).context("Failed to fetch tokenizer")?,
        })
    }
}

/// First existing candidate under `dir` for each file
pub fn find_local_files(dir: &Path, key: ModelKey) -> Option<ModelFiles> {
    let find = |candidates: &[&str]| {
        candidates
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    };

    Some(ModelFiles {
        encoder: find(key.encoder_files())?,
        decoder: find(key.decoder_files())?,
        tokenizer: find(&[key.tokenizer_file()])?,
    })
}

/// Caption backend running encoder and decoder sessions on ONNX Runtime
pub struct OnnxCaptionBackend {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    tokenizer: Tokenizer,
    encoder_input: String,
    /// Decoder input names present in the exported graph
    decoder_inputs: Vec<String>,
    special: SpecialTokens,
    placement: Device,
}

impl std::fmt::Debug for OnnxCaptionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxCaptionBackend")
            .field("encoder_input", &self.encoder_input)
            .field("decoder_inputs", &self.decoder_inputs)
            .field("special", &self.special)
            .field("placement", &self.placement)
            .finish_non_exhaustive()
    }
}

impl OnnxCaptionBackend {
    /// Build sessions and tokenizer from resolved files
    ///
    /// A CUDA device that fails to initialise falls back to CPU with a
    /// warning; the backend then reports itself as reentrant.
    pub fn load(files: &ModelFiles, device: Device, intra_threads: usize) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let (encoder, placement) = build_session(&files.encoder, device, intra_threads)
            .context("Failed to load vision encoder")?;
        let (decoder, _) = build_session(&files.decoder, placement, intra_threads)
            .context("Failed to load text decoder")?;

        let encoder_input = encoder
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "pixel_values".to_string());
        let decoder_inputs: Vec<String> = decoder.inputs.iter().map(|i| i.name.clone()).collect();
        if !decoder_inputs.iter().any(|n| n == "input_ids") {
            anyhow::bail!("Decoder graph has no input_ids input: {:?}", decoder_inputs);
        }
        debug!("Decoder inputs: {:?}", decoder_inputs);

        let special = special_tokens_for(&tokenizer);
        debug!("Special tokens: {:?}", special);

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            tokenizer,
            encoder_input,
            decoder_inputs,
            special,
            placement,
        })
    }

    fn has_decoder_input(&self, name: &str) -> bool {
        self.decoder_inputs.iter().any(|n| n == name)
    }
}

fn build_session(path: &Path, device: Device, intra_threads: usize) -> Result<(Session, Device)> {
    if let Device::Cuda(id) = device {
        let cuda = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(id)
                .build()])
            .context("Failed to set CUDA execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .commit_from_file(path);

        match cuda {
            Ok(session) => return Ok((session, device)),
            Err(e) => {
                warn!("⚠️  CUDA execution provider failed: {}", e);
                warn!("   Falling back to CPU for {}", path.display());
            }
        }
    }

    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .context("Failed to set CPU execution provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(intra_threads)
        .context("Failed to set intra threads")?
        .commit_from_file(path)
        .context(format!("Failed to load ONNX model from {}", path.display()))?;

    Ok((session, Device::Cpu))
}

/// BLIP starts decoding from `[DEC]`, GIT from `[CLS]`
fn special_tokens_for(tokenizer: &Tokenizer) -> SpecialTokens {
    let first = |names: &[&str], fallback: u32| {
        names
            .iter()
            .find_map(|n| tokenizer.token_to_id(n))
            .unwrap_or(fallback)
    };

    SpecialTokens {
        bos: first(&["[DEC]", "[CLS]", "<s>"], 0),
        eos: first(&["[SEP]", "</s>"], 2),
        pad: first(&["[PAD]", "<pad>"], 0),
    }
}

impl CaptionBackend for OnnxCaptionBackend {
    fn encode(&self, pixels: &Array4<f32>) -> Result<Array2<f32>> {
        let shape = pixels.shape();
        if shape[0] != 1 || shape[1] != 3 {
            anyhow::bail!("Invalid input shape: {:?}, expected [1, 3, H, W]", shape);
        }

        let input = Value::from_array(pixels.to_owned()).context("Failed to create input tensor")?;

        let mut session = self.encoder.lock().unwrap_or_else(|p| p.into_inner());
        let outputs = session
            .run(ort::inputs![self.encoder_input.as_str() => input])
            .context("Encoder inference failed")?;

        let hidden = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract encoder output")?;
        debug!("Encoder output shape: {:?}", hidden.shape());

        let states = match hidden.ndim() {
            3 => hidden.index_axis(Axis(0), 0).into_dimensionality::<Ix2>()?.to_owned(),
            2 => hidden.into_dimensionality::<Ix2>()?.to_owned(),
            _ => anyhow::bail!("Unexpected encoder output shape: {:?}", hidden.shape()),
        };
        Ok(states)
    }

    fn next_token_logits(&self, image_states: &Array2<f32>, tokens: &[u32]) -> Result<Vec<f32>> {
        let mut rows = self.next_token_logits_batch(image_states, &[tokens.to_vec()])?;
        rows.pop().ok_or_else(|| anyhow!("Decoder returned no logits"))
    }

    /// All beams share a length, so they run as one batch
    fn next_token_logits_batch(
        &self,
        image_states: &Array2<f32>,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<Vec<f32>>> {
        let batch = sequences.len();
        let seq_len = sequences.first().map(Vec::len).unwrap_or(0);
        if batch == 0 || seq_len == 0 {
            return Ok(Vec::new());
        }
        if sequences.iter().any(|s| s.len() != seq_len) {
            anyhow::bail!("Beam sequences differ in length");
        }

        let ids: Vec<i64> = sequences.iter().flatten().map(|&t| t as i64).collect();
        let input_ids = Array2::from_shape_vec((batch, seq_len), ids)?;
        let attention = Array2::<i64>::ones((batch, seq_len));

        let (states_len, hidden) = image_states.dim();
        let mut states = Array3::<f32>::zeros((batch, states_len, hidden));
        for mut row in states.axis_iter_mut(Axis(0)) {
            row.assign(image_states);
        }
        let states_mask = Array2::<i64>::ones((batch, states_len));

        let mut inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> = vec![(
            "input_ids".into(),
            Value::from_array(input_ids)?.into(),
        )];
        if self.has_decoder_input("attention_mask") {
            inputs.push(("attention_mask".into(), Value::from_array(attention)?.into()));
        }
        if self.has_decoder_input("encoder_hidden_states") {
            inputs.push(("encoder_hidden_states".into(), Value::from_array(states)?.into()));
        }
        if self.has_decoder_input("encoder_attention_mask") {
            inputs.push((
                "encoder_attention_mask".into(),
                Value::from_array(states_mask)?.into(),
            ));
        }

        let mut session = self.decoder.lock().unwrap_or_else(|p| p.into_inner());
        let outputs = session.run(inputs).context("Decoder inference failed")?;

        let logits = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract decoder logits")?;
        last_position_logits(&logits, batch)
    }

    fn special_tokens(&self) -> SpecialTokens {
        self.special
    }

    fn decode_text(&self, tokens: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Decoding failed: {}", e))
    }

    fn is_reentrant(&self) -> bool {
        !self.placement.is_gpu()
    }

    fn placement(&self) -> Option<Device> {
        Some(self.placement)
    }
}

/// Slice `[batch, seq, vocab]` decoder logits down to the last position of each row
fn last_position_logits(logits: &ArrayViewD<'_, f32>, batch: usize) -> Result<Vec<Vec<f32>>> {
    if logits.ndim() != 3 || logits.shape()[0] != batch || logits.shape()[1] == 0 {
        anyhow::bail!("Unexpected decoder output shape: {:?}", logits.shape());
    }

    let last = logits.shape()[1] - 1;
    Ok(logits
        .axis_iter(Axis(0))
        .map(|beam| beam.index_axis(Axis(0), last).iter().copied().collect())
        .collect())
}

/// Loads ONNX caption backends on the blocking pool
#[derive(Debug, Clone)]
pub struct OnnxBackendLoader {
    source: ModelSource,
    intra_threads: usize,
}

impl OnnxBackendLoader {
    pub fn new(source: ModelSource, intra_threads: usize) -> Self {
        Self {
            source,
            intra_threads: intra_threads.max(1),
        }
    }
}

#[async_trait]
impl BackendLoader for OnnxBackendLoader {
    async fn load(&self, key: ModelKey, device: Device) -> Result<Arc<dyn CaptionBackend>> {
        let source = self.source.clone();
        let threads = self.intra_threads;

        let backend = tokio::task::spawn_blocking(move || -> Result<OnnxCaptionBackend> {
            let files = source.resolve(key)?;
            info!("Loading {} from {}", key, files.encoder.display());
            OnnxCaptionBackend::load(&files, device, threads)
        })
        .await
        .context("Model load task aborted")??;

        Ok(Arc::new(backend))
    }
}
