// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Operator trigger routes.
//!
//! Triggers start the run in the background and answer `202 Accepted`
//! straight away; per-item failures only show up in the logs.

use crate::services::scheduler::SchedulerStatus;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Operator routes. The operator-token middleware is applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/collect", post(trigger_collection))
        .route("/api/track-idle-couriers", post(trigger_tracking))
        .route("/api/status", get(get_status))
}

#[derive(Debug, Default, Deserialize)]
pub struct CollectRequest {
    #[serde(default, alias = "isFirstRun")]
    pub is_first_run: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub status: String,
    pub run: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_first_run: Option<bool>,
}

/// Start a collection run.
async fn trigger_collection(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CollectRequest>>,
) -> (StatusCode, Json<TriggerResponse>) {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    tracing::info!(is_first_run = request.is_first_run, "Manual collection requested");

    state.scheduler.run_now(request.is_first_run);

    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            status: "accepted".to_string(),
            run: "collection".to_string(),
            is_first_run: Some(request.is_first_run),
        }),
    )
}

/// Start an idle-tracking run.
async fn trigger_tracking(State(state): State<Arc<AppState>>) -> (StatusCode, Json<TriggerResponse>) {
    tracing::info!("Manual idle tracking requested");

    state.scheduler.run_tracking_now();

    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            status: "accepted".to_string(),
            run: "tracking".to_string(),
            is_first_run: None,
        }),
    )
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status())
}
