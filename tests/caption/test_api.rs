// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// HTTP routes exercised through the router without binding a socket

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use base64::Engine;
use fabstir_caption_node::api::{create_router, AppState};
use fabstir_caption_node::vision::Device;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use crate::common::{
    harness, harness_on, jpeg_bytes, oversized_bytes, CountingLoader, DictionaryProvider, Harness,
};

const BOUNDARY: &str = "caption-test-boundary";

fn router(h: &Harness) -> Router {
    create_router(AppState::new(h.pipeline.clone()))
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn multipart_body(image: Option<&[u8]>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some(image) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"photo.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/caption")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_multipart_caption_with_translation() {
    let h = harness();
    let body = multipart_body(Some(&jpeg_bytes()), &[("model", "primary"), ("language", "fr")]);
    let (status, json) = send(router(&h), multipart_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["caption"], "a dog in a park");
    assert_eq!(json["translated_caption"], "un chien dans un parc");
    assert_eq!(json["language"], "fr");
    assert_eq!(json["language_name"], "French");
    assert_eq!(json["translation_degraded"], false);
    assert_eq!(json["model_used"], "blip");
    let confidence = json["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
}

#[tokio::test]
async fn test_multipart_without_image() {
    let h = harness();
    let body = multipart_body(None, &[("model", "blip")]);
    let (status, json) = send(router(&h), multipart_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error_code"], "INVALID_IMAGE");
}

#[tokio::test]
async fn test_unknown_model_is_bad_request() {
    let h = harness();
    let body = multipart_body(Some(&jpeg_bytes()), &[("model", "unknown")]);
    let (status, json) = send(router(&h), multipart_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "UNSUPPORTED_MODEL");
    assert_eq!(h.loader.loads(), 0);
}

#[tokio::test]
async fn test_unsupported_language_is_bad_request() {
    let h = harness();
    let body = multipart_body(Some(&jpeg_bytes()), &[("language", "xx")]);
    let (status, json) = send(router(&h), multipart_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "UNSUPPORTED_LANGUAGE");
}

#[tokio::test]
async fn test_oversized_upload_is_413() {
    let h = harness();
    let body = multipart_body(Some(&oversized_bytes(12 * 1024 * 1024)), &[]);
    let (status, json) = send(router(&h), multipart_request(body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["error_code"], "PAYLOAD_TOO_LARGE");
    assert_eq!(h.loader.loads(), 0);
}

#[tokio::test]
async fn test_base64_caption() {
    let h = harness();
    let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg_bytes());
    let request = json_request(
        "/api/caption/base64",
        json!({ "image": format!("data:image/jpeg;base64,{}", encoded), "model": "git" }),
    );
    let (status, json) = send(router(&h), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["caption"], "a dog in a park");
    assert_eq!(json["model_used"], "git");
    assert!(json.get("translated_caption").is_none());
}

#[tokio::test]
async fn test_base64_invalid_payload() {
    let h = harness();
    let request = json_request("/api/caption/base64", json!({ "image": "!!not base64!!" }));
    let (status, json) = send(router(&h), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "INVALID_IMAGE");
}

#[tokio::test]
async fn test_base64_malformed_json() {
    let h = harness();
    let request = Request::builder()
        .method("POST")
        .uri("/api/caption/base64")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"image\":"))
        .unwrap();
    let (status, json) = send(router(&h), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error_code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_languages_listing() {
    let h = harness();
    let (status, json) = send(router(&h), get("/api/languages")).await;

    assert_eq!(status, StatusCode::OK);
    let languages = json["languages"].as_array().unwrap();
    assert!(languages.len() >= 50);
    assert!(languages
        .iter()
        .any(|l| l["code"] == "fr" && l["name"] == "French"));
}

#[tokio::test]
async fn test_models_listing() {
    let h = harness();
    let (status, json) = send(router(&h), get("/api/models")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["current_model"], "blip");
    let models = json["models"].as_array().unwrap();
    assert_eq!(models.len(), 2);
    assert!(models
        .iter()
        .any(|m| m["name"] == "git" && m["display_name"] == "GIT (Microsoft)"));
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, json) = send(router(&h), get("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["model"], "blip");
    assert_eq!(json["device"], "cpu");
    assert_eq!(json["loaded_models"], json!([]));
}

#[tokio::test]
async fn test_health_reports_actual_device_after_fallback() {
    let h = harness_on(
        Device::Cuda(0),
        CountingLoader::placed_on(Device::Cpu),
        Arc::new(DictionaryProvider::new()),
        Duration::from_secs(30),
    );
    let (_, json) = send(router(&h), get("/api/health")).await;
    assert_eq!(json["device"], "cuda");

    let body = multipart_body(Some(&jpeg_bytes()), &[]);
    let (status, _) = send(router(&h), multipart_request(body)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(router(&h), get("/api/health")).await;
    assert_eq!(json["device"], "cpu");
    assert_eq!(json["loaded_models"], json!(["blip"]));
}

#[tokio::test]
async fn test_unknown_route_is_404_with_body() {
    let h = harness();
    let (status, json) = send(router(&h), get("/api/nothing-here")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["error_code"], "NOT_FOUND");
}
