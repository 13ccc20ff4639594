// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store for tests and `STORE_BACKEND=memory` runs.
//!
//! Single-process only; all state is lost when the process exits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::RwLock;

use super::Store;
use crate::error::AppError;
use crate::models::{AuthToken, Courier, DailyCourierStats, StatsUpdate};

#[derive(Debug, Default)]
pub struct MemoryDb {
    couriers: DashMap<u64, Courier>,
    stats: DashMap<(u64, i64), DailyCourierStats>,
    token: RwLock<Option<AuthToken>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of daily buckets held.
    pub fn stats_count(&self) -> usize {
        self.stats.len()
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> AppError {
    AppError::Database("token lock poisoned".to_string())
}

#[async_trait]
impl Store for MemoryDb {
    async fn get_courier(&self, courier_id: u64) -> Result<Option<Courier>, AppError> {
        Ok(self.couriers.get(&courier_id).map(|c| c.clone()))
    }

    async fn list_couriers(&self) -> Result<Vec<Courier>, AppError> {
        let mut couriers: Vec<Courier> = self.couriers.iter().map(|c| c.clone()).collect();
        couriers.sort_by_key(|c| c.courier_id);
        Ok(couriers)
    }

    async fn upsert_courier(&self, courier: &Courier) -> Result<(), AppError> {
        self.couriers.insert(courier.courier_id, courier.clone());
        Ok(())
    }

    async fn update_daily_stats(
        &self,
        courier_id: u64,
        day_bucket: i64,
        update: StatsUpdate,
        now: DateTime<Utc>,
    ) -> Result<DailyCourierStats, AppError> {
        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut entry = self
            .stats
            .entry((courier_id, day_bucket))
            .or_insert_with(|| DailyCourierStats::new(courier_id, day_bucket, now));
        entry.apply(update, now);
        Ok(entry.clone())
    }

    async fn get_daily_stats(
        &self,
        courier_id: u64,
        day_bucket: i64,
    ) -> Result<Option<DailyCourierStats>, AppError> {
        Ok(self.stats.get(&(courier_id, day_bucket)).map(|s| s.clone()))
    }

    async fn list_stats_for_courier(
        &self,
        courier_id: u64,
    ) -> Result<Vec<DailyCourierStats>, AppError> {
        let mut stats: Vec<DailyCourierStats> = self
            .stats
            .iter()
            .filter(|s| s.courier_id == courier_id)
            .map(|s| s.clone())
            .collect();
        stats.sort_by(|a, b| b.day_bucket.cmp(&a.day_bucket));
        Ok(stats)
    }

    async fn get_token(&self) -> Result<Option<AuthToken>, AppError> {
        Ok(self.token.read().map_err(poisoned)?.clone())
    }

    async fn replace_token(&self, token: &AuthToken) -> Result<(), AppError> {
        *self.token.write().map_err(poisoned)? = Some(token.clone());
        Ok(())
    }
}
