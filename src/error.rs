// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type.
///
/// Variants follow how far a failure is allowed to reach: `Auth` aborts a
/// run, `UpstreamFetch` degrades one data category, `Mapping` and
/// `MirrorWrite` stay local to one item.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("Malformed upstream data: {0}")]
    Mapping(String),

    #[error("Mirror write failed: {0}")]
    MirrorWrite(String),

    #[error("Not found locally: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Marker carried by errors produced from HTTP 429 responses.
    pub const RATE_LIMITED: &'static str = "Rate limit exceeded";

    /// Whether the upstream (or mirror) asked us to back off.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            AppError::UpstreamFetch(msg) | AppError::MirrorWrite(msg) | AppError::Auth(msg) => {
                msg.contains(Self::RATE_LIMITED)
            }
            _ => false,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Auth(msg) => (StatusCode::BAD_GATEWAY, "auth_error", Some(msg.clone())),
            AppError::UpstreamFetch(msg) => {
                (StatusCode::BAD_GATEWAY, "upstream_error", Some(msg.clone()))
            }
            AppError::Mapping(msg) => (StatusCode::BAD_GATEWAY, "mapping_error", Some(msg.clone())),
            AppError::MirrorWrite(msg) => {
                (StatusCode::BAD_GATEWAY, "mirror_error", Some(msg.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, AppError>;
