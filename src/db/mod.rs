// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persistence layer.
//!
//! The engine talks to storage through [`Store`]; Firestore backs production
//! and [`MemoryDb`] backs tests and local runs.

pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{AuthToken, Courier, DailyCourierStats, StatsUpdate};

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

/// Collection names as constants.
pub mod collections {
    pub const COURIERS: &str = "couriers";
    /// Daily aggregates (keyed by `{courier_id}_{day_bucket}`)
    pub const DAILY_COURIER_STATS: &str = "daily_courier_stats";
    pub const AUTH_TOKENS: &str = "auth_tokens";
    /// Document id of the one authoritative token record
    pub const ACTIVE_TOKEN_ID: &str = "active";
}

/// Upsert-by-key storage used by the sync engine.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_courier(&self, courier_id: u64) -> Result<Option<Courier>, AppError>;

    /// All couriers, ascending by id.
    async fn list_couriers(&self) -> Result<Vec<Courier>, AppError>;

    /// Create or replace a courier by id.
    async fn upsert_courier(&self, courier: &Courier) -> Result<(), AppError>;

    /// Atomically apply `update` to the (courier, day) bucket, creating it on
    /// first touch. Returns the bucket as written.
    async fn update_daily_stats(
        &self,
        courier_id: u64,
        day_bucket: i64,
        update: StatsUpdate,
        now: DateTime<Utc>,
    ) -> Result<DailyCourierStats, AppError>;

    async fn get_daily_stats(
        &self,
        courier_id: u64,
        day_bucket: i64,
    ) -> Result<Option<DailyCourierStats>, AppError>;

    /// Buckets for one courier, newest day first.
    async fn list_stats_for_courier(
        &self,
        courier_id: u64,
    ) -> Result<Vec<DailyCourierStats>, AppError>;

    async fn get_token(&self) -> Result<Option<AuthToken>, AppError>;

    /// Replace the singleton token record.
    async fn replace_token(&self, token: &AuthToken) -> Result<(), AppError>;
}
