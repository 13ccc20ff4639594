// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Daily per-courier aggregates.
//!
//! One document per (courier, day bucket). Metrics are last-write-wins per
//! field, earnings only ever grow, and the cash balance is a single snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named metric and when upstream last changed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// One aggregated earnings transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Earning {
    pub amount: f64,
    pub currency: String,
    pub transaction_type: String,
    pub company_id: String,
    pub recorded_at: DateTime<Utc>,
}

/// Current cash held by a courier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashBalance {
    pub amount: f64,
    pub currency: String,
    pub company_id: String,
    pub updated_at: DateTime<Utc>,
}

/// A single mutation of a daily bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsUpdate {
    /// Overwrite the listed metrics; others are left alone
    SetMetrics(BTreeMap<String, MetricValue>),
    /// Append transactions; never merged or deduplicated
    AppendEarnings(Vec<Earning>),
    /// Replace the cash-balance snapshot
    SetCashBalance(CashBalance),
}

/// Aggregate for one courier on one local day.
///
/// Stored at: `daily_courier_stats/{courier_id}_{day_bucket}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCourierStats {
    pub courier_id: u64,
    /// Local midnight, epoch milliseconds
    pub day_bucket: i64,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricValue>,
    #[serde(default)]
    pub earnings: Vec<Earning>,
    #[serde(default)]
    pub cash_balance: Option<CashBalance>,
    /// Bumped on every mutation
    pub latest_update: DateTime<Utc>,
    /// When the bucket was first created
    pub collected_at: DateTime<Utc>,
}

impl DailyCourierStats {
    pub fn new(courier_id: u64, day_bucket: i64, now: DateTime<Utc>) -> Self {
        Self {
            courier_id,
            day_bucket,
            metrics: BTreeMap::new(),
            earnings: Vec::new(),
            cash_balance: None,
            latest_update: now,
            collected_at: now,
        }
    }

    pub fn document_id(courier_id: u64, day_bucket: i64) -> String {
        format!("{}_{}", courier_id, day_bucket)
    }

    /// Apply one mutation in place.
    pub fn apply(&mut self, update: StatsUpdate, now: DateTime<Utc>) {
        match update {
            StatsUpdate::SetMetrics(metrics) => self.metrics.extend(metrics),
            StatsUpdate::AppendEarnings(earnings) => self.earnings.extend(earnings),
            StatsUpdate::SetCashBalance(balance) => self.cash_balance = Some(balance),
        }
        self.latest_update = now;
    }

    /// Sum of all appended earnings amounts.
    pub fn total_earnings(&self) -> f64 {
        self.earnings.iter().map(|e| e.amount).sum()
    }
}
