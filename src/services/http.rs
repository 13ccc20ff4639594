// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Response checking shared by the outbound API clients.

use crate::error::AppError;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Which upstream a response came from; selects the error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Fleet,
    Auth,
    Distance,
    Mirror,
}

impl Upstream {
    fn name(self) -> &'static str {
        match self {
            Upstream::Fleet => "fleet",
            Upstream::Auth => "auth",
            Upstream::Distance => "distance",
            Upstream::Mirror => "mirror",
        }
    }

    /// Wrap a message in the error variant for this upstream.
    pub fn error(self, msg: impl Into<String>) -> AppError {
        let msg = msg.into();
        match self {
            Upstream::Fleet | Upstream::Distance => AppError::UpstreamFetch(msg),
            Upstream::Auth => AppError::Auth(msg),
            Upstream::Mirror => AppError::MirrorWrite(msg),
        }
    }

    /// Transport failure (connect error, timeout).
    pub fn transport(self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            return self.error(format!("{} request timed out: {}", self.name(), err));
        }
        self.error(format!("{} request failed: {}", self.name(), err))
    }
}

/// Build a client with the per-request timeout applied.
pub fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Check response status and return error if not successful.
pub async fn check_response(
    upstream: Upstream,
    response: reqwest::Response,
) -> Result<reqwest::Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status.as_u16() == 429 {
        tracing::warn!(upstream = upstream.name(), "Rate limit hit (429)");
        return Err(upstream.error(AppError::RATE_LIMITED));
    }

    // Expired or revoked bearer token
    if status.as_u16() == 401 && matches!(upstream, Upstream::Fleet | Upstream::Auth) {
        return Err(AppError::Auth(format!("HTTP {}: {}", status, body)));
    }

    Err(upstream.error(format!("HTTP {}: {}", status, body)))
}

/// Check response and parse JSON body.
pub async fn check_response_json<T: DeserializeOwned>(
    upstream: Upstream,
    response: reqwest::Response,
) -> Result<T, AppError> {
    check_response(upstream, response)
        .await?
        .json()
        .await
        .map_err(|e| upstream.error(format!("JSON parse error: {}", e)))
}
