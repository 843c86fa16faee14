// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// tests/caption_tests.rs - Include all caption test modules

mod common;

mod caption {
    mod test_api;
    mod test_pipeline;
    mod test_translation;
}
