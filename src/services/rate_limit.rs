// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fixed-delay pacing between per-courier external calls.

use std::time::Duration;

/// Sleeps a fixed delay between consecutive calls.
///
/// The mirror system enforces a request quota, so per-courier writes run
/// sequentially with this pause between them. Tests use [`RateLimiter::disabled`].
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    delay: Duration,
}

impl RateLimiter {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::fixed(Duration::from_millis(ms))
    }

    /// No pause at all.
    pub fn disabled() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait out the configured delay.
    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}
