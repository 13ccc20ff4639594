// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Couriers (profile mirrored from the fleet system)
//! - Daily courier stats (metrics, earnings, cash balance per day)
//! - The active fleet API token (singleton document)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{collections, Store};
use crate::error::AppError;
use crate::models::{AuthToken, Courier, DailyCourierStats, StatsUpdate};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator takes an unauthenticated connection; skip local credential lookup.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client; every operation returns an error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

#[async_trait]
impl Store for FirestoreDb {
    // ─── Courier Operations ──────────────────────────────────────

    async fn get_courier(&self, courier_id: u64) -> Result<Option<Courier>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::COURIERS)
            .obj()
            .one(&courier_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_couriers(&self) -> Result<Vec<Courier>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::COURIERS)
            .order_by([("courier_id", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn upsert_courier(&self, courier: &Courier) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::COURIERS)
            .document_id(courier.courier_id.to_string())
            .object(courier)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Daily Stats Operations ──────────────────────────────────

    /// Read-modify-write of one bucket inside a Firestore transaction.
    ///
    /// The read is registered with the transaction, so a concurrent writer
    /// to the same bucket aborts the commit and the closure is retried on
    /// fresh data.
    async fn update_daily_stats(
        &self,
        courier_id: u64,
        day_bucket: i64,
        update: StatsUpdate,
        now: DateTime<Utc>,
    ) -> Result<DailyCourierStats, AppError> {
        let doc_id = DailyCourierStats::document_id(courier_id, day_bucket);

        let stats = self
            .get_client()?
            .run_transaction(move |db, transaction| {
                let update = update.clone();
                let doc_id = doc_id.clone();
                Box::pin(async move {
                    let current: Option<DailyCourierStats> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::DAILY_COURIER_STATS)
                        .obj()
                        .one(&doc_id)
                        .await?;

                    let mut stats = current
                        .unwrap_or_else(|| DailyCourierStats::new(courier_id, day_bucket, now));
                    stats.apply(update, now);

                    db.fluent()
                        .update()
                        .in_col(collections::DAILY_COURIER_STATS)
                        .document_id(&doc_id)
                        .object(&stats)
                        .add_to_transaction(transaction)?;

                    Ok(stats)
                })
            })
            .await
            .map_err(|e| AppError::Database(format!("Stats transaction failed: {}", e)))?;

        tracing::debug!(courier_id, day_bucket, "Daily stats updated");

        Ok(stats)
    }

    async fn get_daily_stats(
        &self,
        courier_id: u64,
        day_bucket: i64,
    ) -> Result<Option<DailyCourierStats>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::DAILY_COURIER_STATS)
            .obj()
            .one(&DailyCourierStats::document_id(courier_id, day_bucket))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_stats_for_courier(
        &self,
        courier_id: u64,
    ) -> Result<Vec<DailyCourierStats>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::DAILY_COURIER_STATS)
            .filter(|q| q.for_all([q.field("courier_id").eq(courier_id)]))
            .order_by([("day_bucket", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Token Operations ────────────────────────────────────────

    async fn get_token(&self) -> Result<Option<AuthToken>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::AUTH_TOKENS)
            .obj()
            .one(collections::ACTIVE_TOKEN_ID)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn replace_token(&self, token: &AuthToken) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::AUTH_TOKENS)
            .document_id(collections::ACTIVE_TOKEN_ID)
            .object(token)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
