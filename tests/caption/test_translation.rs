// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Translation service against counting providers

use fabstir_caption_node::translation::{TranslationError, SUPPORTED_LANGUAGES};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

use crate::common::{translator, DictionaryProvider, FailingProvider};

#[tokio::test]
async fn test_repeated_translation_hits_provider_once() {
    let provider = Arc::new(DictionaryProvider::new());
    let service = translator(provider.clone());

    let first = assert_ok!(service.translate("a dog in a park", "es").await);
    let second = assert_ok!(service.translate("a dog in a park", "es").await);

    assert_eq!(first.translated_text.as_deref(), Some("un perro en un parque"));
    assert_eq!(second.translated_text, first.translated_text);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_unsupported_language_makes_no_call() {
    let provider = Arc::new(DictionaryProvider::new());
    let service = translator(provider.clone());

    let err = assert_err!(service.translate("a dog in a park", "tlh").await);
    assert_eq!(
        err,
        TranslationError::UnsupportedLanguage {
            code: "tlh".to_string()
        }
    );
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_failing_provider_is_degraded_not_cached() {
    let provider = Arc::new(FailingProvider::new());
    let service = translator(provider.clone());

    let outcome = service.translate("a dog in a park", "de").await.unwrap();
    assert!(outcome.degraded);
    assert!(outcome.translated_text.is_none());
    assert_eq!(outcome.target_name, "German");

    service.translate("a dog in a park", "de").await.unwrap();
    // two attempts per request, nothing cached in between
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn test_english_target_skips_provider() {
    let provider = Arc::new(DictionaryProvider::new());
    let service = translator(provider.clone());

    let outcome = service.translate("a dog in a park", "en").await.unwrap();
    assert_eq!(outcome.translated_text.as_deref(), Some("a dog in a park"));
    assert!(!outcome.degraded);
    assert_eq!(provider.calls(), 0);
}

#[test]
fn test_language_table_size() {
    assert!(SUPPORTED_LANGUAGES.len() >= 50);
    let french = SUPPORTED_LANGUAGES.iter().find(|l| l.code == "fr").unwrap();
    assert_eq!(french.name, "French");
}
