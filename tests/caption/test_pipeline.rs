// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// End-to-end pipeline behaviour with scripted models and providers

use bytes::Bytes;
use fabstir_caption_node::caption::{CaptionError, CaptionRequest, CaptionResponse};
use fabstir_caption_node::vision::ModelKey;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::{
    harness, harness_with, jpeg_bytes, oversized_bytes, png_bytes, CountingLoader,
    DictionaryProvider, FailingProvider, Harness,
};

fn request(bytes: Vec<u8>, model: Option<&str>, language: Option<&str>) -> CaptionRequest {
    CaptionRequest::new(Bytes::from(bytes), model, language, ModelKey::Blip).unwrap()
}

/// Poll the registry in small steps until `key` is loaded or `limit` passes
async fn wait_until_loaded(h: &Harness, key: ModelKey, limit: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if h.registry.is_loaded(key) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    h.registry.is_loaded(key)
}

#[tokio::test]
async fn test_primary_without_language_has_no_translation() {
    let h = harness();
    let result = h
        .pipeline
        .caption(request(jpeg_bytes(), Some("primary"), None))
        .await
        .unwrap();

    assert_eq!(result.caption, "a dog in a park");
    assert_eq!(result.model_used, ModelKey::Blip);
    assert!(result.translated_caption.is_none());
    assert!(result.target_language_code.is_none());
    assert!((0.0..=1.0).contains(&result.confidence));

    let json = serde_json::to_value(CaptionResponse::from(result)).unwrap();
    assert!(json.get("translated_caption").is_none());
    assert!(json.get("language").is_none());
    assert!(json.get("translation_degraded").is_none());
}

#[tokio::test]
async fn test_french_translation() {
    let provider = Arc::new(DictionaryProvider::new());
    let h = harness_with(CountingLoader::new(), provider.clone(), Duration::from_secs(30));

    let result = h
        .pipeline
        .caption(request(jpeg_bytes(), Some("primary"), Some("fr")))
        .await
        .unwrap();

    assert_eq!(result.translated_caption.as_deref(), Some("un chien dans un parc"));
    assert_eq!(result.target_language_name, Some("French"));
    assert!(!result.translation_degraded);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_failing_provider_degrades() {
    let provider = Arc::new(FailingProvider::new());
    let h = harness_with(CountingLoader::new(), provider.clone(), Duration::from_secs(30));

    let result = h
        .pipeline
        .caption(request(png_bytes(), None, Some("es")))
        .await
        .unwrap();

    assert!(!result.caption.is_empty());
    assert!(result.translation_degraded);
    assert!(result.translated_caption.is_none());
    assert_eq!(result.target_language_code, Some("es"));
    // first attempt plus one retry
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_oversized_image_never_loads_model() {
    let h = harness();
    let err = h
        .pipeline
        .caption(request(oversized_bytes(12 * 1024 * 1024), None, None))
        .await
        .unwrap_err();

    assert!(matches!(err, CaptionError::PayloadTooLarge { .. }));
    assert_eq!(h.loader.loads(), 0);
}

#[tokio::test]
async fn test_invalid_image_never_loads_model() {
    let h = harness();
    let err = h
        .pipeline
        .caption(request(b"not an image at all".to_vec(), None, None))
        .await
        .unwrap_err();

    assert!(matches!(err, CaptionError::InvalidImage(_)));
    assert_eq!(h.loader.loads(), 0);
}

#[tokio::test]
async fn test_model_load_failure_is_retried_later() {
    let h = harness_with(
        CountingLoader::with(1, Duration::ZERO),
        Arc::new(DictionaryProvider::new()),
        Duration::from_secs(30),
    );

    let err = h
        .pipeline
        .caption(request(jpeg_bytes(), None, None))
        .await
        .unwrap_err();
    assert!(matches!(err, CaptionError::ModelLoad { .. }));
    assert!(!h.registry.is_loaded(ModelKey::Blip));

    let result = h.pipeline.caption(request(jpeg_bytes(), None, None)).await.unwrap();
    assert_eq!(result.caption, "a dog in a park");
    assert_eq!(h.loader.loads(), 2);
}

#[tokio::test]
async fn test_deadline_reports_timeout_and_load_completes() {
    let h = harness_with(
        CountingLoader::with(0, Duration::from_millis(300)),
        Arc::new(DictionaryProvider::new()),
        Duration::from_millis(50),
    );

    let err = h
        .pipeline
        .caption(request(jpeg_bytes(), None, None))
        .await
        .unwrap_err();
    assert_eq!(err, CaptionError::Timeout { timeout_ms: 50 });

    // The abandoned request keeps loading in the background
    assert!(wait_until_loaded(&h, ModelKey::Blip, Duration::from_secs(5)).await);
    assert_eq!(h.loader.loads(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_load() {
    let h = harness_with(
        CountingLoader::with(0, Duration::from_millis(50)),
        Arc::new(DictionaryProvider::new()),
        Duration::from_secs(30),
    );

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let pipeline = h.pipeline.clone();
            tokio::spawn(async move { pipeline.caption(request(jpeg_bytes(), None, None)).await })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
    assert_eq!(h.loader.loads(), 1);
}

#[tokio::test]
async fn test_models_load_independently() {
    let h = harness();
    h.pipeline
        .caption(request(jpeg_bytes(), Some("git"), None))
        .await
        .unwrap();

    assert!(h.registry.is_loaded(ModelKey::Git));
    assert!(!h.registry.is_loaded(ModelKey::Blip));
}

#[tokio::test]
async fn test_caption_batch_keeps_failures_separate() {
    let h = harness();
    let requests = vec![
        request(jpeg_bytes(), None, Some("fr")),
        request(b"garbage".to_vec(), None, None),
        request(png_bytes(), Some("git"), None),
    ];

    let results = h.pipeline.caption_batch(requests).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(CaptionError::InvalidImage(_))));
    assert_eq!(results[2].as_ref().unwrap().model_used, ModelKey::Git);
}

#[test]
fn test_unknown_model_rejected_before_preprocessing() {
    // Garbage bytes would fail preprocessing; the model error comes first
    let err = CaptionRequest::new(
        Bytes::from_static(b"garbage"),
        Some("unknown"),
        None,
        ModelKey::Blip,
    )
    .unwrap_err();
    assert_eq!(
        err,
        CaptionError::UnsupportedModel {
            model: "unknown".to_string()
        }
    );
}
