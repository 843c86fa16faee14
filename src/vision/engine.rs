// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption generation
//!
//! The image is encoded once, then an autoregressive beam search runs over
//! the text decoder. Finished hypotheses are ranked by length-normalized log
//! probability.
//!
//! # Confidence
//!
//! The confidence attached to a caption is `exp(mean token log-prob)` of the
//! chosen beam. It measures how fluent the model found its own output, not
//! whether the caption is correct, and must not be read as a calibrated
//! accuracy estimate.

use anyhow::{anyhow, Result};
use ndarray::{Array2, Array4};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use super::backend::{CaptionBackend, DecodeParams};
use super::preprocessing::PreparedImage;
use super::registry::ModelHandle;
use crate::caption::error::CaptionError;

/// Result of one caption generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    /// Generated ids of the chosen beam, without the start token
    pub token_ids: Vec<u32>,
    /// Log probability of each generated token, including end-of-sequence when reached
    pub token_log_probs: Vec<f32>,
    pub elapsed_ms: u64,
}

impl GenerationOutput {
    /// Fluency proxy in `[0, 1]`; see the module docs
    pub fn confidence(&self) -> f32 {
        confidence_from_log_probs(&self.token_log_probs)
    }
}

/// `exp(mean(log_probs))`, clamped to `[0, 1]`
///
/// Empty or non-finite input yields 0.
pub fn confidence_from_log_probs(log_probs: &[f32]) -> f32 {
    if log_probs.is_empty() {
        return 0.0;
    }
    let mean = log_probs.iter().map(|&lp| lp as f64).sum::<f64>() / log_probs.len() as f64;
    let value = mean.exp() as f32;
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Runs generation on loaded model handles
#[derive(Debug, Clone, Default)]
pub struct InferenceEngine;

impl InferenceEngine {
    pub fn new() -> Self {
        Self
    }

    /// Encode the image and decode a caption
    ///
    /// Work runs on the blocking pool. Backends that are not reentrant are
    /// serialized through the handle's lock. Failures, including a panic in
    /// the backend, surface as `Inference` and leave the handle usable.
    pub async fn generate(
        &self,
        handle: Arc<ModelHandle>,
        image: PreparedImage,
        params: DecodeParams,
    ) -> Result<GenerationOutput, CaptionError> {
        let model = handle.model_key();
        let join = tokio::task::spawn_blocking(move || {
            handle.with_backend(|backend| generate_blocking(backend, &image.tensor, &params))
        })
        .await;

        match join {
            Ok(Ok(output)) => {
                debug!(
                    "Generated {} tokens with {} in {}ms",
                    output.token_ids.len(),
                    model,
                    output.elapsed_ms
                );
                Ok(output)
            }
            Ok(Err(err)) => {
                error!("Caption generation with {} failed: {:#}", model, err);
                Err(classify_failure(&err))
            }
            Err(join_err) => {
                error!("Caption generation with {} aborted: {}", model, join_err);
                Err(CaptionError::Inference("model execution aborted".to_string()))
            }
        }
    }
}

/// Map a backend failure to a client-safe message
fn classify_failure(err: &anyhow::Error) -> CaptionError {
    let text = format!("{:#}", err).to_lowercase();
    if text.contains("out of memory") || text.contains("failed to allocate") {
        CaptionError::Inference("out of memory".to_string())
    } else if text.contains("empty caption") {
        CaptionError::Inference("model produced an empty caption".to_string())
    } else {
        CaptionError::Inference("model execution failed".to_string())
    }
}

/// Synchronous encode + beam search + detokenize
pub fn generate_blocking(
    backend: &dyn CaptionBackend,
    pixels: &Array4<f32>,
    params: &DecodeParams,
) -> Result<GenerationOutput> {
    let start = Instant::now();
    let image_states = backend.encode(pixels)?;
    let hypothesis = beam_search(backend, &image_states, params)?;

    let special = backend.special_tokens();
    let content: Vec<u32> = hypothesis
        .tokens
        .iter()
        .copied()
        .filter(|&t| t != special.eos && t != special.bos && t != special.pad)
        .collect();

    let text = backend.decode_text(&content)?.trim().to_string();
    if text.is_empty() {
        return Err(anyhow!("empty caption after {} tokens", hypothesis.tokens.len()));
    }

    Ok(GenerationOutput {
        text,
        token_ids: hypothesis.tokens,
        token_log_probs: hypothesis.log_probs,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

/// A completed or truncated beam
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Generated ids without the start token
    pub tokens: Vec<u32>,
    pub log_probs: Vec<f32>,
    /// Sum of `log_probs`
    pub score: f32,
}

impl Hypothesis {
    fn normalized_score(&self, length_penalty: f32) -> f32 {
        let len = self.log_probs.len().max(1) as f32;
        self.score / len.powf(length_penalty)
    }
}

/// Standard beam search over `backend`'s decoder
///
/// Stops when `num_beams` hypotheses have emitted end-of-sequence or
/// `max_length` tokens have been generated. Live beams are promoted to
/// finished when the length cap is hit.
pub fn beam_search(
    backend: &dyn CaptionBackend,
    image_states: &Array2<f32>,
    params: &DecodeParams,
) -> Result<Hypothesis> {
    let special = backend.special_tokens();
    let num_beams = params.num_beams.max(1);

    let mut beams = vec![Hypothesis {
        tokens: Vec::new(),
        log_probs: Vec::new(),
        score: 0.0,
    }];
    let mut finished: Vec<Hypothesis> = Vec::new();

    for step in 0..params.max_length {
        let sequences: Vec<Vec<u32>> = beams
            .iter()
            .map(|b| {
                let mut seq = Vec::with_capacity(b.tokens.len() + 1);
                seq.push(special.bos);
                seq.extend_from_slice(&b.tokens);
                seq
            })
            .collect();

        let logits = backend.next_token_logits_batch(image_states, &sequences)?;
        if logits.len() != beams.len() {
            return Err(anyhow!(
                "backend returned {} logit rows for {} beams",
                logits.len(),
                beams.len()
            ));
        }

        // (beam index, token, token log prob, cumulative score)
        let mut candidates: Vec<(usize, u32, f32, f32)> = Vec::new();
        for (beam_idx, row) in logits.iter().enumerate() {
            let mut log_probs =
                log_softmax(row).ok_or_else(|| anyhow!("non-finite logits at step {}", step))?;
            if step < params.min_length {
                if let Some(lp) = log_probs.get_mut(special.eos as usize) {
                    *lp = f32::NEG_INFINITY;
                }
            }
            for (token, lp) in top_k(&log_probs, 2 * num_beams) {
                candidates.push((beam_idx, token, lp, beams[beam_idx].score + lp));
            }
        }

        candidates.sort_by(|a, b| {
            b.3.partial_cmp(&a.3)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
                .then(a.1.cmp(&b.1))
        });

        let mut next = Vec::with_capacity(num_beams);
        for (rank, (beam_idx, token, lp, score)) in candidates.into_iter().enumerate() {
            let parent = &beams[beam_idx];
            let mut tokens = parent.tokens.clone();
            let mut log_probs = parent.log_probs.clone();
            tokens.push(token);
            log_probs.push(lp);
            let hyp = Hypothesis {
                tokens,
                log_probs,
                score,
            };

            if token == special.eos {
                // Only end-of-sequence among the best `num_beams` counts as done
                if rank < num_beams {
                    finished.push(hyp);
                }
            } else {
                next.push(hyp);
            }

            if next.len() == num_beams {
                break;
            }
        }

        beams = next;
        if finished.len() >= num_beams || beams.is_empty() {
            break;
        }
    }

    if finished.len() < num_beams {
        finished.extend(beams);
    }

    finished
        .into_iter()
        .max_by(|a, b| {
            a.normalized_score(params.length_penalty)
                .partial_cmp(&b.normalized_score(params.length_penalty))
                .unwrap_or(Ordering::Equal)
        })
        .ok_or_else(|| anyhow!("beam search produced no hypotheses"))
}

/// Numerically stable log-softmax; `None` when no finite logit exists or any is NaN
pub fn log_softmax(logits: &[f32]) -> Option<Vec<f32>> {
    if logits.iter().any(|v| v.is_nan()) {
        return None;
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return None;
    }
    let sum: f64 = logits.iter().map(|&v| ((v - max) as f64).exp()).sum();
    let lse = max + sum.ln() as f32;
    Some(logits.iter().map(|&v| v - lse).collect())
}

/// Highest `k` finite entries, best first, ties broken by lower token id
fn top_k(values: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| (i as u32, v))
        .collect();

    let by_score = |a: &(u32, f32), b: &(u32, f32)| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    };

    if indexed.len() > k && k > 0 {
        indexed.select_nth_unstable_by(k - 1, by_score);
        indexed.truncate(k);
    }
    indexed.sort_by(by_score);
    indexed.truncate(k);
    indexed
}
