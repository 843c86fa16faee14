// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Rate limiting for outbound translation requests

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovRateLimiter};
use std::num::NonZeroU32;

use super::types::TranslationError;

const FALLBACK_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(60) {
    Some(v) => v,
    None => NonZeroU32::MIN,
};

/// Provider-wide request quota
pub struct TranslationRateLimiter {
    limiter: GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    requests_per_minute: u32,
}

impl TranslationRateLimiter {
    /// Create a limiter; zero falls back to 60 per minute
    pub fn new(requests_per_minute: u32) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(FALLBACK_PER_MINUTE);
        Self {
            limiter: GovRateLimiter::direct(Quota::per_minute(rpm)),
            requests_per_minute: rpm.get(),
        }
    }

    /// Non-blocking check; callers degrade instead of waiting
    pub fn check(&self) -> Result<(), TranslationError> {
        self.limiter
            .check()
            .map_err(|_| TranslationError::RateLimited {
                retry_after_secs: 60,
            })
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }
}
