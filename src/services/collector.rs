// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reconciliation of fleet data into the store and the mirror.
//!
//! A run walks four categories in order: couriers, metrics, earnings and
//! cash balances. Failures are contained at the narrowest level possible:
//! - a bad item is logged and counted, the loop continues
//! - a failed category fetch is logged, the next category still runs
//! - only failing to obtain a token aborts the run

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{CashBalance, Courier, Earning, MetricValue, StatsUpdate};
use crate::services::auth::TokenManager;
use crate::services::fleet::{
    CashBalanceEntry, CourierPayload, EarningsEntry, FleetApi, MetricsEntry, TransactionPayload,
};
use crate::services::mirror::{cash_balance_cells, courier_cells, MirrorSystem, MirrorTable};
use crate::services::rate_limit::RateLimiter;
use crate::time_utils::{collection_window, day_bucket, parse_instant, Clock, CollectionWindow};

/// Per-category outcome counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Summary of one collection run.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CollectionReport {
    /// The run started outside the operating window and did nothing
    pub skipped_outside_window: bool,
    pub window: Option<CollectionWindow>,
    pub couriers: BatchStats,
    pub metrics: BatchStats,
    pub earnings: BatchStats,
    pub cash_balances: BatchStats,
    /// Mirror writes that failed after a successful local write
    pub mirror_failures: usize,
    /// Categories whose upstream fetch failed
    pub failed_categories: Vec<&'static str>,
}

/// Knobs for the collector that come from configuration.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub timezone: Tz,
    pub company_id: String,
    pub default_currency: String,
    pub courier_pacer: RateLimiter,
    pub cash_balance_pacer: RateLimiter,
}

impl CollectorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timezone: config.timezone,
            company_id: config.fleet.company_id.clone(),
            default_currency: config.default_currency.clone(),
            courier_pacer: RateLimiter::from_millis(config.courier_sync_delay_ms),
            cash_balance_pacer: RateLimiter::from_millis(config.cash_balance_delay_ms),
        }
    }
}

/// Outcome of reconciling one item.
enum ItemOutcome {
    Processed,
    Skipped,
}

pub struct DataCollector {
    fleet: Arc<dyn FleetApi>,
    tokens: Arc<TokenManager>,
    store: Arc<dyn Store>,
    mirror: Arc<dyn MirrorSystem>,
    clock: Arc<dyn Clock>,
    settings: CollectorSettings,
}

impl DataCollector {
    pub fn new(
        fleet: Arc<dyn FleetApi>,
        tokens: Arc<TokenManager>,
        store: Arc<dyn Store>,
        mirror: Arc<dyn MirrorSystem>,
        clock: Arc<dyn Clock>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            fleet,
            tokens,
            store,
            mirror,
            clock,
            settings,
        }
    }

    /// Run one collection cycle.
    ///
    /// Outside 06:00-23:00 local time this returns immediately without any
    /// external call. `is_first_run` collects the whole previous day instead
    /// of today so far.
    pub async fn collect(&self, is_first_run: bool) -> Result<CollectionReport> {
        let started = self.clock.now();
        let mut report = CollectionReport::default();

        let Some(window) = collection_window(started, &self.settings.timezone, is_first_run) else {
            tracing::info!("Outside operating hours (06:00-23:00), skipping data collection");
            report.skipped_outside_window = true;
            return Ok(report);
        };
        report.window = Some(window);

        tracing::info!(
            is_first_run,
            from = window.from_secs,
            to = window.to_secs,
            day_bucket = window.day_bucket,
            "Starting data collection"
        );

        let token = self.tokens.get_valid_token().await?;
        match self.sync_couriers(&token, &mut report).await {
            Ok(stats) => report.couriers = stats,
            Err(e) => Self::category_failed(&mut report, "couriers", &e),
        }

        let token = self.tokens.get_valid_token().await?;
        match self.sync_metrics(&token, &window).await {
            Ok(stats) => report.metrics = stats,
            Err(e) => Self::category_failed(&mut report, "metrics", &e),
        }

        let token = self.tokens.get_valid_token().await?;
        match self.sync_earnings(&token, &window).await {
            Ok(stats) => report.earnings = stats,
            Err(e) => Self::category_failed(&mut report, "earnings", &e),
        }

        let token = self.tokens.get_valid_token().await?;
        match self.sync_cash_balances(&token, &mut report).await {
            Ok(stats) => report.cash_balances = stats,
            Err(e) => Self::category_failed(&mut report, "cash_balances", &e),
        }

        tracing::info!(
            couriers = ?report.couriers,
            metrics = ?report.metrics,
            earnings = ?report.earnings,
            cash_balances = ?report.cash_balances,
            mirror_failures = report.mirror_failures,
            failed_categories = ?report.failed_categories,
            "Data collection complete"
        );

        Ok(report)
    }

    fn category_failed(report: &mut CollectionReport, category: &'static str, err: &AppError) {
        tracing::error!(
            category,
            error = %err,
            rate_limited = err.is_rate_limited(),
            "Category sync failed, continuing with next category"
        );
        report.failed_categories.push(category);
    }

    // ─── Couriers ────────────────────────────────────────────────────────────

    async fn sync_couriers(&self, token: &str, report: &mut CollectionReport) -> Result<BatchStats> {
        let payloads = self.fleet.list_couriers(token).await?;
        tracing::info!(count = payloads.len(), "Fetched courier roster");

        let mut stats = BatchStats::default();
        for (i, payload) in payloads.iter().enumerate() {
            if i > 0 {
                self.settings.courier_pacer.pause().await;
            }
            match self.sync_courier(payload, report).await {
                Ok(ItemOutcome::Processed) => stats.processed += 1,
                Ok(ItemOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    tracing::error!(courier_id = ?payload.id, error = %e, "Error processing courier");
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Upsert one courier, then push it to the mirror if it has no row yet.
    async fn sync_courier(
        &self,
        payload: &CourierPayload,
        report: &mut CollectionReport,
    ) -> Result<ItemOutcome> {
        let Some(courier_id) = payload.id else {
            tracing::warn!("Skipping courier entry without id");
            return Ok(ItemOutcome::Skipped);
        };

        let existing = self.store.get_courier(courier_id).await?;
        let now = self.clock.now();
        let Some(mut courier) = Courier::from_payload(payload, existing.as_ref(), now) else {
            return Ok(ItemOutcome::Skipped);
        };

        if existing.as_ref() != Some(&courier) {
            self.store.upsert_courier(&courier).await?;
            tracing::debug!(courier_id, created = existing.is_none(), "Courier upserted");
        }

        if courier.mirror_row_id.is_none() {
            match self
                .mirror
                .add_row(MirrorTable::Couriers, courier_cells(&courier))
                .await
            {
                Ok(row_id) => {
                    tracing::info!(courier_id, row_id = %row_id, "Courier added to mirror");
                    courier.mirror_row_id = Some(row_id);
                    courier.mirror_synced_at = Some(now);
                    self.store.upsert_courier(&courier).await?;
                }
                Err(e) => {
                    tracing::warn!(courier_id, error = %e, "Mirror push failed, will retry next run");
                    report.mirror_failures += 1;
                }
            }
        }

        Ok(ItemOutcome::Processed)
    }

    // ─── Metrics ─────────────────────────────────────────────────────────────

    async fn sync_metrics(&self, token: &str, window: &CollectionWindow) -> Result<BatchStats> {
        let entries = self
            .fleet
            .get_metrics(token, window.from_secs, window.to_secs)
            .await?;
        tracing::info!(count = entries.len(), "Fetched metrics");

        let mut stats = BatchStats::default();
        for entry in &entries {
            match self.apply_metrics(entry, window.day_bucket).await {
                Ok(ItemOutcome::Processed) => stats.processed += 1,
                Ok(ItemOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    tracing::error!(courier_id = ?entry.courier_id, error = %e, "Error processing metrics");
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }

    async fn apply_metrics(&self, entry: &MetricsEntry, bucket: i64) -> Result<ItemOutcome> {
        let Some(courier_id) = entry.courier_id else {
            tracing::warn!("Skipping metric processing due to missing courier id");
            return Ok(ItemOutcome::Skipped);
        };

        let now = self.clock.now();
        let metrics = extract_metrics(courier_id, &entry.fields, now);
        if metrics.is_empty() {
            tracing::debug!(courier_id, "No metric fields in entry");
            return Ok(ItemOutcome::Skipped);
        }

        self.store
            .update_daily_stats(courier_id, bucket, StatsUpdate::SetMetrics(metrics), now)
            .await?;
        Ok(ItemOutcome::Processed)
    }

    // ─── Earnings ────────────────────────────────────────────────────────────

    async fn sync_earnings(&self, token: &str, window: &CollectionWindow) -> Result<BatchStats> {
        let entries = self
            .fleet
            .get_earnings(token, window.from_secs, window.to_secs)
            .await?;
        tracing::info!(count = entries.len(), "Fetched earnings");

        let mut stats = BatchStats::default();
        for entry in &entries {
            match self.apply_earnings(entry, window.day_bucket).await {
                Ok(ItemOutcome::Processed) => stats.processed += 1,
                Ok(ItemOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    tracing::error!(courier_id = ?entry.courier_id, error = %e, "Error processing earnings");
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Append the entry's transactions. Overlapping windows can append the
    /// same transaction twice; nothing here deduplicates.
    async fn apply_earnings(&self, entry: &EarningsEntry, bucket: i64) -> Result<ItemOutcome> {
        let (Some(courier_id), Some(transactions)) =
            (entry.courier_id, entry.aggregated_transactions.as_ref())
        else {
            tracing::warn!(courier_id = ?entry.courier_id, "Missing required data for earnings processing");
            return Ok(ItemOutcome::Skipped);
        };

        let now = self.clock.now();
        let company_id = entry
            .company_id
            .clone()
            .unwrap_or_else(|| self.settings.company_id.clone());
        let earnings: Vec<Earning> = transactions
            .iter()
            .map(|t| self.to_earning(t, &company_id, now))
            .collect();

        if earnings.is_empty() {
            return Ok(ItemOutcome::Skipped);
        }

        let count = earnings.len();
        self.store
            .update_daily_stats(courier_id, bucket, StatsUpdate::AppendEarnings(earnings), now)
            .await?;
        tracing::debug!(courier_id, count, "Appended earnings transactions");
        Ok(ItemOutcome::Processed)
    }

    fn to_earning(&self, t: &TransactionPayload, company_id: &str, now: DateTime<Utc>) -> Earning {
        Earning {
            amount: t.amount.unwrap_or(0.0),
            currency: t
                .currency
                .clone()
                .unwrap_or_else(|| self.settings.default_currency.clone()),
            transaction_type: t
                .transaction_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            company_id: company_id.to_string(),
            recorded_at: now,
        }
    }

    // ─── Cash balances ───────────────────────────────────────────────────────

    async fn sync_cash_balances(
        &self,
        token: &str,
        report: &mut CollectionReport,
    ) -> Result<BatchStats> {
        let entries = self.fleet.get_cash_balances(token).await?;
        tracing::info!(count = entries.len(), "Fetched cash balances");

        // Cash balance has no history: always today's bucket, taken once.
        let today = day_bucket(self.clock.now(), &self.settings.timezone);

        let mut stats = BatchStats::default();
        for entry in &entries {
            if stats.processed + stats.failed > 0 {
                self.settings.cash_balance_pacer.pause().await;
            }
            match self.apply_cash_balance(entry, today, report).await {
                Ok(ItemOutcome::Processed) => stats.processed += 1,
                Ok(ItemOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    tracing::error!(courier_id = ?entry.courier_id, error = %e, "Error processing cash balance");
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }

    async fn apply_cash_balance(
        &self,
        entry: &CashBalanceEntry,
        bucket: i64,
        report: &mut CollectionReport,
    ) -> Result<ItemOutcome> {
        let Some(courier_id) = entry.courier_id else {
            tracing::warn!("Skipping cash balance without courier id");
            return Ok(ItemOutcome::Skipped);
        };
        let Some(amount) = entry.amount else {
            tracing::warn!(courier_id, "Skipping cash balance without amount");
            return Ok(ItemOutcome::Skipped);
        };
        let Some(mut courier) = self.store.get_courier(courier_id).await? else {
            tracing::warn!(courier_id, "Skipping cash balance update: courier not found locally");
            return Ok(ItemOutcome::Skipped);
        };

        let now = self.clock.now();
        let balance = CashBalance {
            amount,
            currency: entry
                .currency_code
                .clone()
                .unwrap_or_else(|| self.settings.default_currency.clone()),
            company_id: entry
                .company_id
                .clone()
                .unwrap_or_else(|| self.settings.company_id.clone()),
            updated_at: entry.updated_at.as_ref().and_then(parse_instant).unwrap_or(now),
        };

        self.store
            .update_daily_stats(courier_id, bucket, StatsUpdate::SetCashBalance(balance), now)
            .await?;
        tracing::debug!(courier_id, amount, "Cash balance updated");

        if let Some(row_id) = courier.mirror_row_id.clone() {
            match self
                .mirror
                .update_row(MirrorTable::Couriers, &row_id, cash_balance_cells(amount))
                .await
            {
                Ok(()) => {
                    courier.mirror_synced_at = Some(now);
                    self.store.upsert_courier(&courier).await?;
                }
                Err(e) => {
                    tracing::warn!(courier_id, error = %e, "Mirror cash balance update failed");
                    report.mirror_failures += 1;
                }
            }
        }

        Ok(ItemOutcome::Processed)
    }
}

/// Pick out fields shaped like `{value, updatedAt}`.
///
/// A missing or unparseable `updatedAt` becomes `now`; a non-numeric value
/// is stored as `None`.
pub fn extract_metrics(
    courier_id: u64,
    fields: &serde_json::Map<String, serde_json::Value>,
    now: DateTime<Utc>,
) -> BTreeMap<String, MetricValue> {
    fields
        .iter()
        .filter_map(|(name, raw)| {
            let obj = raw.as_object()?;
            let value = obj.get("value")?;
            let updated_at = match obj.get("updatedAt") {
                Some(ts) => parse_instant(ts).unwrap_or_else(|| {
                    tracing::warn!(courier_id, metric = %name, "Invalid updatedAt, using current time");
                    now
                }),
                None => now,
            };
            let value = value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()));
            Some((name.clone(), MetricValue { value, updated_at }))
        })
        .collect()
}
