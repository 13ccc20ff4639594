// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Operator bearer-token check for the trigger routes.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Require `Authorization: Bearer <OPERATOR_TOKEN>` when a token is configured.
///
/// With no token configured the routes are open (local development).
pub async fn require_operator(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.config.operator_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or("");

    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        tracing::warn!(path = %request.uri().path(), "Blocked operator request with bad token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
