// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Courier profile mirrored from the fleet system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::fleet::CourierPayload;
use crate::time_utils::parse_utc_calendar_date;

/// Courier record stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Courier {
    /// Fleet courier ID (also used as document ID)
    pub courier_id: u64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Display name as reported upstream
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contract_type: Option<String>,
    pub vehicle_type: Option<String>,
    pub allow_shift_reservation: Option<bool>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub is_disabled: bool,
    /// Team used to pick hotspots; learned from the roster or detail feed
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub contract_valid_from: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Row reference in the spreadsheet mirror
    #[serde(default)]
    pub mirror_row_id: Option<String>,
    /// Last successful mirror push
    #[serde(default)]
    pub mirror_synced_at: Option<DateTime<Utc>>,
}

impl Courier {
    /// Map a roster entry onto the stored shape.
    ///
    /// Fields this system owns (mirror reference, cached team) are carried
    /// over from `existing`. Dates upstream omits fall back to the stored
    /// value, then to `now`, so re-applying an identical payload is a no-op.
    /// Returns `None` when the entry has no courier id.
    pub fn from_payload(
        payload: &CourierPayload,
        existing: Option<&Courier>,
        now: DateTime<Utc>,
    ) -> Option<Courier> {
        let courier_id = payload.id?;

        let created_at = payload
            .created_at
            .as_ref()
            .and_then(parse_courier_date)
            .or(existing.map(|c| c.created_at))
            .unwrap_or(now);
        let updated_at = payload
            .updated_at
            .as_ref()
            .and_then(parse_courier_date)
            .or(existing.map(|c| c.updated_at))
            .unwrap_or(now);

        Some(Courier {
            courier_id,
            first_name: payload.first_name.clone(),
            last_name: payload.last_name.clone(),
            name: payload.name.clone(),
            email: payload.email.clone(),
            phone: payload.phone.clone(),
            contract_type: payload.contract_type.clone(),
            vehicle_type: payload.vehicle_type.clone(),
            allow_shift_reservation: payload.allow_shift_reservation,
            capabilities: payload.capabilities.clone().unwrap_or_default(),
            is_disabled: payload.is_disabled.unwrap_or(false),
            team: payload
                .team
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .or_else(|| existing.and_then(|c| c.team.clone())),
            contract_valid_from: payload
                .contract_valid_from
                .as_ref()
                .and_then(parse_courier_date),
            created_at,
            updated_at,
            mirror_row_id: existing.and_then(|c| c.mirror_row_id.clone()),
            mirror_synced_at: existing.and_then(|c| c.mirror_synced_at),
        })
    }

    /// Display name for logs and the mirror.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            _ => self
                .name
                .clone()
                .unwrap_or_else(|| self.courier_id.to_string()),
        }
    }
}

/// Roster dates: strings are read as UTC calendar dates, numbers as epoch ms.
///
/// Anything else (or an impossible date) becomes `None`.
pub fn parse_courier_date(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => parse_utc_calendar_date(s),
        serde_json::Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}
