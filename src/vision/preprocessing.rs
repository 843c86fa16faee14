// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for caption models
//!
//! Turns raw upload bytes into the `[1, 3, H, W]` tensor a vision encoder
//! expects. Each model declares its input size, resize mode and
//! normalization through a [`TargetSpec`].

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use tracing::debug;

use super::image_utils::{decode_image_bytes, DEFAULT_MAX_IMAGE_BYTES};
use crate::caption::error::CaptionError;

/// CLIP normalization mean values (BLIP and GIT both use these)
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std values
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Bicubic, matching the Python image processors these models ship with
const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// How an image is fitted to the square encoder input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    /// Resize to exact size (may distort aspect ratio)
    #[default]
    Stretch,
    /// Resize keeping aspect ratio with center crop
    CenterCrop,
    /// Resize keeping aspect ratio with padding (letterbox)
    Letterbox,
}

/// Per-model input contract
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSpec {
    /// Square edge length in pixels
    pub input_size: u32,
    pub resize_mode: ResizeMode,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl TargetSpec {
    pub const fn new(input_size: u32, resize_mode: ResizeMode) -> Self {
        Self {
            input_size,
            resize_mode,
            mean: CLIP_MEAN,
            std: CLIP_STD,
        }
    }
}

/// A normalized image ready for the encoder
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// NCHW tensor `[1, 3, input_size, input_size]`
    pub tensor: Array4<f32>,
    pub original_format: ImageFormat,
    /// Original width before resizing
    pub width: u32,
    /// Original height before resizing
    pub height: u32,
    pub byte_size: usize,
}

/// Validates and normalizes uploads
///
/// Size is checked before anything is decoded, so oversized payloads never
/// reach the image decoder or a model.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    max_bytes: usize,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IMAGE_BYTES)
    }
}

impl ImagePreprocessor {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Cheap size gate usable before any other work
    pub fn check_size(&self, byte_len: usize) -> Result<(), CaptionError> {
        if byte_len > self.max_bytes {
            return Err(CaptionError::PayloadTooLarge {
                size: byte_len,
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Decode, convert to RGB, resize and normalize
    ///
    /// Deterministic: identical bytes and spec produce an identical tensor.
    pub fn prepare(&self, bytes: &[u8], spec: &TargetSpec) -> Result<PreparedImage, CaptionError> {
        self.check_size(bytes.len())?;

        let (image, info) = decode_image_bytes(bytes, self.max_bytes)?;
        if info.width == 0 || info.height == 0 {
            return Err(CaptionError::InvalidImage("image has zero area".to_string()));
        }

        let tensor = image_to_tensor(&image, spec);
        debug!(
            "Prepared {}x{} {:?} image ({} bytes) -> {:?}",
            info.width,
            info.height,
            info.format,
            info.size_bytes,
            tensor.shape()
        );

        Ok(PreparedImage {
            tensor,
            original_format: info.format,
            width: info.width,
            height: info.height,
            byte_size: info.size_bytes,
        })
    }
}

/// Resize and normalize a decoded image into an NCHW tensor
///
/// Normalization is `(pixel / 255 - mean) / std` per channel.
pub fn image_to_tensor(image: &DynamicImage, spec: &TargetSpec) -> Array4<f32> {
    let resized = resize_for_encoder(image, spec.input_size, spec.resize_mode);
    let rgb = resized.to_rgb8();

    let size = spec.input_size as usize;
    let mut tensor = Array4::zeros((1, 3, size, size));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 / 255.0 - spec.mean[c]) / spec.std[c];
        }
    }

    tensor
}

/// Resize image to a square target using the given mode
pub fn resize_for_encoder(image: &DynamicImage, target_size: u32, mode: ResizeMode) -> DynamicImage {
    let (orig_w, orig_h) = image.dimensions();

    if orig_w == 0 || orig_h == 0 {
        return DynamicImage::ImageRgb8(RgbImage::from_pixel(
            target_size,
            target_size,
            Rgb([128, 128, 128]),
        ));
    }

    // Alpha and palette images are flattened first so every mode sees RGB
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());

    match mode {
        ResizeMode::Stretch => rgb.resize_exact(target_size, target_size, RESIZE_FILTER),
        ResizeMode::CenterCrop => center_crop_resize(&rgb, target_size),
        ResizeMode::Letterbox => letterbox_resize(&rgb, target_size),
    }
}

/// Scale to cover the target, then crop the middle
fn center_crop_resize(image: &DynamicImage, target_size: u32) -> DynamicImage {
    let (orig_w, orig_h) = image.dimensions();

    let scale = (target_size as f32 / orig_w as f32).max(target_size as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * scale).round() as u32).max(target_size);
    let new_h = ((orig_h as f32 * scale).round() as u32).max(target_size);

    let resized = image.resize_exact(new_w, new_h, RESIZE_FILTER);

    let crop_x = (new_w - target_size) / 2;
    let crop_y = (new_h - target_size) / 2;

    resized.crop_imm(crop_x, crop_y, target_size, target_size)
}

/// Scale to fit inside the target and pad with gray
fn letterbox_resize(image: &DynamicImage, target_size: u32) -> DynamicImage {
    let (orig_w, orig_h) = image.dimensions();

    let scale = (target_size as f32 / orig_w as f32).min(target_size as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, target_size);

    let resized = image.resize_exact(new_w, new_h, RESIZE_FILTER).to_rgb8();

    let mut output = RgbImage::from_pixel(target_size, target_size, Rgb([128, 128, 128]));
    let offset_x = (target_size - new_w) / 2;
    let offset_y = (target_size - new_h) / 2;
    image::imageops::replace(&mut output, &resized, offset_x as i64, offset_y as i64);

    DynamicImage::ImageRgb8(output)
}
