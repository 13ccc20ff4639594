// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Courier-Sync Server
//!
//! Runs the scheduled fleet data collection and idle tracking, and exposes
//! operator triggers over HTTP.

use courier_sync::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, MemoryDb, Store},
    services::{self, Collaborators},
    time_utils::SystemClock,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        port = config.port,
        company_id = %config.fleet.company_id,
        timezone = %config.timezone,
        "Starting Courier-Sync"
    );

    let db: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(
            FirestoreDb::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore"),
        ),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    let deps = Collaborators::from_config(&config, db.clone(), Arc::new(SystemClock));
    let scheduler = services::build_scheduler(&config, deps);

    // Keep the job scheduler handle alive for the lifetime of the server
    let mut jobs = scheduler
        .start()
        .await
        .expect("Failed to start scheduler");

    if config.run_immediate_collection {
        tracing::info!("Running immediate collection on startup");
        scheduler.run_now(false);
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        scheduler,
    });

    let app = courier_sync::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = jobs.shutdown().await {
        tracing::warn!(error = %e, "Scheduler shutdown failed");
    }
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("courier_sync=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping");
}
