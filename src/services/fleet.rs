// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fleet-management API client.
//!
//! Handles:
//! - Courier roster and per-courier detail
//! - Metrics and earnings for an epoch-seconds window
//! - Current cash balances
//! - Live delivery-status and location feeds
//!
//! List endpoints are decoded one record at a time so a single malformed
//! entry is dropped with a warning instead of failing the whole list.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::config::FleetConfig;
use crate::error::AppError;
use crate::services::http::{build_client, check_response_json, Upstream};

/// Operations the engine needs from the fleet system.
#[async_trait]
pub trait FleetApi: Send + Sync {
    async fn list_couriers(&self, token: &str) -> Result<Vec<CourierPayload>, AppError>;

    async fn get_courier_detail(
        &self,
        token: &str,
        courier_id: u64,
    ) -> Result<CourierDetail, AppError>;

    /// Status entries updated after `updated_after` (epoch seconds).
    async fn get_delivery_statuses(
        &self,
        token: &str,
        updated_after: i64,
    ) -> Result<Vec<DeliveryStatus>, AppError>;

    /// Location entries updated after `updated_after` (epoch seconds).
    async fn get_locations(
        &self,
        token: &str,
        updated_after: i64,
    ) -> Result<Vec<CourierLocation>, AppError>;

    async fn get_metrics(
        &self,
        token: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<MetricsEntry>, AppError>;

    async fn get_earnings(
        &self,
        token: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<EarningsEntry>, AppError>;

    async fn get_cash_balances(&self, token: &str) -> Result<Vec<CashBalanceEntry>, AppError>;
}

/// Fleet API client.
#[derive(Clone)]
pub struct FleetClient {
    http: reqwest::Client,
    company_path: String,
    management_url: String,
    metrics_url: String,
    earnings_url: String,
    tracking_url: String,
}

impl FleetClient {
    pub fn new(config: &FleetConfig, timeout: Duration) -> Self {
        Self {
            http: build_client(timeout),
            company_path: format!("companies/{}", urlencoding::encode(&config.company_id)),
            management_url: config.management_url.trim_end_matches('/').to_string(),
            metrics_url: config.metrics_url.trim_end_matches('/').to_string(),
            earnings_url: config.earnings_url.trim_end_matches('/').to_string(),
            tracking_url: config.tracking_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, base: &str, path: &str) -> String {
        format!("{}/{}/{}", base, self.company_path, path)
    }

    /// Generic GET request returning a JSON array.
    async fn get_list<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| Upstream::Fleet.transport(e))?;

        let body: serde_json::Value = check_response_json(Upstream::Fleet, response).await?;
        decode_records(body, url)
    }
}

/// Decode a JSON array record by record, dropping entries of the wrong shape.
fn decode_records<T: DeserializeOwned>(
    body: serde_json::Value,
    source: &str,
) -> Result<Vec<T>, AppError> {
    let serde_json::Value::Array(items) = body else {
        return Err(AppError::UpstreamFetch(format!(
            "Expected JSON array from {}",
            source
        )));
    };

    let total = items.len();
    let records: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(source, error = %e, "Dropping malformed upstream record");
                None
            }
        })
        .collect();

    if records.len() < total {
        tracing::warn!(source, total, kept = records.len(), "Some records were dropped");
    }

    Ok(records)
}

#[async_trait]
impl FleetApi for FleetClient {
    async fn list_couriers(&self, token: &str) -> Result<Vec<CourierPayload>, AppError> {
        let url = self.url(&self.management_url, "couriers");
        self.get_list(&url, token, &[]).await
    }

    async fn get_courier_detail(
        &self,
        token: &str,
        courier_id: u64,
    ) -> Result<CourierDetail, AppError> {
        let url = self.url(&self.management_url, &format!("couriers/{}", courier_id));
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Upstream::Fleet.transport(e))?;

        check_response_json(Upstream::Fleet, response).await
    }

    async fn get_delivery_statuses(
        &self,
        token: &str,
        updated_after: i64,
    ) -> Result<Vec<DeliveryStatus>, AppError> {
        let url = self.url(&self.tracking_url, "delivery-statuses");
        self.get_list(&url, token, &[("updatedAfter", updated_after.to_string())])
            .await
    }

    async fn get_locations(
        &self,
        token: &str,
        updated_after: i64,
    ) -> Result<Vec<CourierLocation>, AppError> {
        let url = self.url(&self.tracking_url, "locations");
        self.get_list(&url, token, &[("updatedAfter", updated_after.to_string())])
            .await
    }

    async fn get_metrics(
        &self,
        token: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<MetricsEntry>, AppError> {
        let url = self.url(&self.metrics_url, "metrics/v2");
        self.get_list(&url, token, &[("from", from.to_string()), ("to", to.to_string())])
            .await
    }

    async fn get_earnings(
        &self,
        token: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<EarningsEntry>, AppError> {
        let url = self.url(&self.earnings_url, "earnings");
        self.get_list(&url, token, &[("from", from.to_string()), ("to", to.to_string())])
            .await
    }

    async fn get_cash_balances(&self, token: &str) -> Result<Vec<CashBalanceEntry>, AppError> {
        let url = self.url(&self.metrics_url, "cash-balances");
        self.get_list(&url, token, &[]).await
    }
}

// ─── Payloads ────────────────────────────────────────────────────────────────

/// Roster entry. Dates arrive as strings or epoch ms, so they stay loosely typed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierPayload {
    pub id: Option<u64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contract_type: Option<String>,
    pub vehicle_type: Option<String>,
    pub allow_shift_reservation: Option<bool>,
    pub capabilities: Option<Vec<String>>,
    pub is_disabled: Option<bool>,
    pub team: Option<String>,
    pub contract_valid_from: Option<serde_json::Value>,
    pub created_at: Option<serde_json::Value>,
    pub updated_at: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierDetail {
    pub id: Option<u64>,
    pub team: Option<String>,
}

/// Per-courier metrics: everything besides the id is a candidate metric.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsEntry {
    pub courier_id: Option<u64>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsEntry {
    pub courier_id: Option<u64>,
    pub company_id: Option<String>,
    pub aggregated_transactions: Option<Vec<TransactionPayload>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub transaction_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashBalanceEntry {
    pub courier_id: Option<u64>,
    pub company_id: Option<String>,
    pub amount: Option<f64>,
    pub currency_code: Option<String>,
    pub updated_at: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatus {
    pub courier_id: u64,
    pub status: String,
}

impl DeliveryStatus {
    pub fn is_idle(&self) -> bool {
        self.status == "idle"
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierLocation {
    pub courier_id: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: Option<serde_json::Value>,
}

impl CourierLocation {
    pub fn point(&self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}
