// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Idle-courier hotspot assignment.
//!
//! Finds couriers reported idle in the last minute, locates them, and writes
//! the nearest hotspot of their team (by cycling distance) to the mirror.
//! The mirror is the only place assignments are recorded.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::services::auth::TokenManager;
use crate::services::distance::{DistanceApi, DistanceElement, TravelMode};
use crate::services::fleet::{CourierLocation, FleetApi};
use crate::services::hotspot::{HotspotService, HotspotSource};
use crate::services::mirror::{hotspot_cells, MirrorSystem, MirrorTable};
use crate::services::rate_limit::RateLimiter;
use crate::time_utils::Clock;

/// Look-back for the delivery-status feed.
pub const STATUS_LOOKBACK_SECS: i64 = 60;
/// Look-back for the location feed; a little wider to absorb skew between feeds.
pub const LOCATION_LOOKBACK_SECS: i64 = 63;

/// One hotspot written to the mirror.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotAssignment {
    pub courier_id: u64,
    pub hotspot: String,
    pub distance_km: f64,
}

/// Summary of one tracking run.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct TrackingReport {
    pub idle: usize,
    pub located: usize,
    pub assigned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub assignments: Vec<HotspotAssignment>,
}

/// Index and distance (meters) of the closest destination with an OK status.
///
/// Strict `<` keeps the first of equal minimums.
pub fn select_nearest(elements: &[DistanceElement]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, element) in elements.iter().enumerate() {
        if !element.is_ok() {
            continue;
        }
        let Some(meters) = element.distance_meters else {
            continue;
        };
        let closer = match best {
            None => true,
            Some((_, current)) => meters < current,
        };
        if closer {
            best = Some((i, meters));
        }
    }
    best
}

pub struct IdleTracker {
    fleet: Arc<dyn FleetApi>,
    tokens: Arc<TokenManager>,
    store: Arc<dyn Store>,
    distance: Arc<dyn DistanceApi>,
    mirror: Arc<dyn MirrorSystem>,
    hotspots: Arc<dyn HotspotSource>,
    clock: Arc<dyn Clock>,
    pacer: RateLimiter,
}

impl IdleTracker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fleet: Arc<dyn FleetApi>,
        tokens: Arc<TokenManager>,
        store: Arc<dyn Store>,
        distance: Arc<dyn DistanceApi>,
        mirror: Arc<dyn MirrorSystem>,
        hotspots: Arc<dyn HotspotSource>,
        clock: Arc<dyn Clock>,
        pacer: RateLimiter,
    ) -> Self {
        Self {
            fleet,
            tokens,
            store,
            distance,
            mirror,
            hotspots,
            clock,
            pacer,
        }
    }

    /// Assign every currently idle courier to its nearest team hotspot.
    ///
    /// Per-courier problems are logged and counted. Failing to get a token,
    /// fetch either feed, or load the hotspot dataset aborts the run.
    pub async fn track_idle_couriers(&self) -> Result<TrackingReport> {
        let mut report = TrackingReport::default();

        let token = self.tokens.get_valid_token().await?;
        let now = self.clock.now().timestamp();

        let statuses = self
            .fleet
            .get_delivery_statuses(&token, now - STATUS_LOOKBACK_SECS)
            .await?;
        let idle: HashSet<u64> = statuses
            .iter()
            .filter(|s| s.is_idle())
            .map(|s| s.courier_id)
            .collect();
        report.idle = idle.len();
        tracing::info!(count = report.idle, "Found idle couriers");

        if idle.is_empty() {
            return Ok(report);
        }

        let mut seen = HashSet::new();
        let located: Vec<CourierLocation> = self
            .fleet
            .get_locations(&token, now - LOCATION_LOOKBACK_SECS)
            .await?
            .into_iter()
            .filter(|l| idle.contains(&l.courier_id) && seen.insert(l.courier_id))
            .collect();
        report.located = located.len();

        let dataset = self
            .hotspots
            .load()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to load hotspots: {}", e)))?;

        for (i, location) in located.iter().enumerate() {
            if i > 0 {
                self.pacer.pause().await;
            }
            match self.assign(&token, &dataset, location).await {
                Ok(Some(assignment)) => {
                    report.assigned += 1;
                    report.assignments.push(assignment);
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        courier_id = location.courier_id,
                        error = %e,
                        "Hotspot assignment failed"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            idle = report.idle,
            located = report.located,
            assigned = report.assigned,
            skipped = report.skipped,
            failed = report.failed,
            "Idle courier tracking complete"
        );

        Ok(report)
    }

    /// Returns `Ok(None)` when the courier is skipped (unknown locally or
    /// not mirrored).
    async fn assign(
        &self,
        token: &str,
        dataset: &HotspotService,
        location: &CourierLocation,
    ) -> Result<Option<HotspotAssignment>> {
        let courier_id = location.courier_id;

        let Some(mut courier) = self.store.get_courier(courier_id).await? else {
            tracing::warn!(courier_id, "Idle courier not found locally, skipping");
            return Ok(None);
        };
        let Some(row_id) = courier.mirror_row_id.clone() else {
            tracing::warn!(courier_id, "Courier has no mirror row, skipping hotspot update");
            return Ok(None);
        };

        let team = match courier.team.clone() {
            Some(team) => team,
            None => {
                let detail = self.fleet.get_courier_detail(token, courier_id).await?;
                let team = detail
                    .team
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        AppError::Mapping(format!("Courier {} has no team", courier_id))
                    })?;
                courier.team = Some(team.clone());
                self.store.upsert_courier(&courier).await?;
                team
            }
        };

        let team_hotspots = dataset.for_team(&team);
        if team_hotspots.is_empty() {
            return Err(AppError::NotFound(format!(
                "No hotspots found for team {}",
                team
            )));
        }

        let destinations: Vec<_> = team_hotspots.iter().map(|h| h.location).collect();
        let elements = self
            .distance
            .matrix(location.point(), &destinations, TravelMode::Bicycling)
            .await?;
        if elements.len() != destinations.len() {
            return Err(AppError::UpstreamFetch(format!(
                "Distance matrix returned {} elements for {} destinations",
                elements.len(),
                destinations.len()
            )));
        }

        let (index, meters) = select_nearest(&elements).ok_or_else(|| {
            AppError::UpstreamFetch(format!(
                "No usable distance for courier {} to team {}",
                courier_id, team
            ))
        })?;
        let hotspot = team_hotspots.get(index).ok_or_else(|| {
            AppError::UpstreamFetch(format!("Distance index {} out of range", index))
        })?;
        let distance_km = meters / 1000.0;

        self.mirror
            .update_row(
                MirrorTable::Hotspots,
                &row_id,
                hotspot_cells(&hotspot.name, distance_km),
            )
            .await?;

        tracing::info!(
            courier_id,
            team = %team,
            hotspot = %hotspot.name,
            distance_km,
            "Updated nearest hotspot"
        );

        Ok(Some(HotspotAssignment {
            courier_id,
            hotspot: hotspot.name.clone(),
            distance_km,
        }))
    }
}
