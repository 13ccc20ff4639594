// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Spreadsheet mirror (Coda) for human-facing copies of courier data.
//!
//! The local store is authoritative; mirror writes are best effort and a
//! failure never rolls back a local upsert.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::MirrorConfig;
use crate::error::AppError;
use crate::models::Courier;
use crate::services::http::{build_client, check_response, check_response_json, Upstream};
use crate::time_utils::format_calendar_date;

/// Column names in the mirror tables.
pub mod columns {
    pub const COURIER_ID: &str = "Courier ID";
    pub const FIRST_NAME: &str = "First Name";
    pub const LAST_NAME: &str = "Last Name";
    pub const EMAIL: &str = "Email";
    pub const PHONE: &str = "Phone";
    pub const CONTRACT_TYPE: &str = "Contract Type";
    pub const VEHICLE_TYPE: &str = "Vehicle Type";
    pub const DISABLED: &str = "Disabled";
    pub const CREATED: &str = "Created";
    pub const UPDATED: &str = "Updated";
    pub const CASH_BALANCE: &str = "Cash Balance";
    pub const NEAREST_HOTSPOT: &str = "Nearest Hotspot";
    pub const HOTSPOT_DISTANCE_KM: &str = "Hotspot Distance (km)";
}

/// The two logical tables written by this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorTable {
    Couriers,
    Hotspots,
}

/// One cell write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorCell {
    pub column: String,
    pub value: serde_json::Value,
}

impl MirrorCell {
    pub fn new(column: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            column: column.to_string(),
            value: value.into(),
        }
    }
}

#[async_trait]
pub trait MirrorSystem: Send + Sync {
    /// Insert a row and return its row id.
    async fn add_row(&self, table: MirrorTable, cells: Vec<MirrorCell>) -> Result<String, AppError>;

    async fn update_row(
        &self,
        table: MirrorTable,
        row_id: &str,
        cells: Vec<MirrorCell>,
    ) -> Result<(), AppError>;
}

/// Cells for a courier's profile row.
pub fn courier_cells(courier: &Courier) -> Vec<MirrorCell> {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    vec![
        MirrorCell::new(columns::COURIER_ID, courier.courier_id),
        MirrorCell::new(columns::FIRST_NAME, text(&courier.first_name)),
        MirrorCell::new(columns::LAST_NAME, text(&courier.last_name)),
        MirrorCell::new(columns::EMAIL, text(&courier.email)),
        MirrorCell::new(columns::PHONE, text(&courier.phone)),
        MirrorCell::new(columns::CONTRACT_TYPE, text(&courier.contract_type)),
        MirrorCell::new(columns::VEHICLE_TYPE, text(&courier.vehicle_type)),
        MirrorCell::new(columns::DISABLED, courier.is_disabled),
        MirrorCell::new(columns::CREATED, format_calendar_date(courier.created_at)),
        MirrorCell::new(columns::UPDATED, format_calendar_date(courier.updated_at)),
    ]
}

pub fn cash_balance_cells(amount: f64) -> Vec<MirrorCell> {
    vec![MirrorCell::new(columns::CASH_BALANCE, amount)]
}

/// Hotspot name plus distance in km, written as computed.
pub fn hotspot_cells(hotspot_name: &str, distance_km: f64) -> Vec<MirrorCell> {
    vec![
        MirrorCell::new(columns::NEAREST_HOTSPOT, hotspot_name),
        MirrorCell::new(columns::HOTSPOT_DISTANCE_KM, distance_km),
    ]
}

// ─── Coda ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct CodaClient {
    http: reqwest::Client,
    api_url: String,
    api_token: String,
    doc_id: String,
    courier_table_id: String,
    hotspot_table_id: String,
}

#[derive(Serialize)]
struct RowCells<'a> {
    cells: &'a [MirrorCell],
}

#[derive(Serialize)]
struct InsertRows<'a> {
    rows: [RowCells<'a>; 1],
}

#[derive(Serialize)]
struct UpdateRow<'a> {
    row: RowCells<'a>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertRowsResponse {
    #[serde(default)]
    added_row_ids: Vec<String>,
}

impl CodaClient {
    pub fn new(config: &MirrorConfig, timeout: Duration) -> Self {
        Self {
            http: build_client(timeout),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            doc_id: config.doc_id.clone(),
            courier_table_id: config.courier_table_id.clone(),
            hotspot_table_id: config.hotspot_table_id.clone(),
        }
    }

    fn rows_url(&self, table: MirrorTable) -> String {
        let table_id = match table {
            MirrorTable::Couriers => &self.courier_table_id,
            MirrorTable::Hotspots => &self.hotspot_table_id,
        };
        format!(
            "{}/docs/{}/tables/{}/rows",
            self.api_url,
            urlencoding::encode(&self.doc_id),
            urlencoding::encode(table_id)
        )
    }
}

#[async_trait]
impl MirrorSystem for CodaClient {
    async fn add_row(&self, table: MirrorTable, cells: Vec<MirrorCell>) -> Result<String, AppError> {
        let body = InsertRows {
            rows: [RowCells { cells: &cells }],
        };

        let response = self
            .http
            .post(self.rows_url(table))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Upstream::Mirror.transport(e))?;

        let parsed: InsertRowsResponse = check_response_json(Upstream::Mirror, response).await?;
        parsed
            .added_row_ids
            .into_iter()
            .next()
            .ok_or_else(|| AppError::MirrorWrite("Mirror returned no row id".to_string()))
    }

    async fn update_row(
        &self,
        table: MirrorTable,
        row_id: &str,
        cells: Vec<MirrorCell>,
    ) -> Result<(), AppError> {
        let url = format!("{}/{}", self.rows_url(table), urlencoding::encode(row_id));
        let body = UpdateRow {
            row: RowCells { cells: &cells },
        };

        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Upstream::Mirror.transport(e))?;

        check_response(Upstream::Mirror, response).await?;
        Ok(())
    }
}

/// Stand-in used when mirror credentials are not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMirror;

impl DisabledMirror {
    pub const MESSAGE: &'static str = "mirror integration not configured";
}

#[async_trait]
impl MirrorSystem for DisabledMirror {
    async fn add_row(&self, _table: MirrorTable, _cells: Vec<MirrorCell>) -> Result<String, AppError> {
        Err(AppError::MirrorWrite(Self::MESSAGE.to_string()))
    }

    async fn update_row(
        &self,
        _table: MirrorTable,
        _row_id: &str,
        _cells: Vec<MirrorCell>,
    ) -> Result<(), AppError> {
        Err(AppError::MirrorWrite(Self::MESSAGE.to_string()))
    }
}
