// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared fakes and builders for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use courier_sync::config::Config;
use courier_sync::db::{FirestoreDb, MemoryDb, Store};
use courier_sync::error::AppError;
use courier_sync::models::AuthToken;
use courier_sync::routes::create_router;
use courier_sync::services::auth::TokenGrant;
use courier_sync::services::distance::{DistanceElement, TravelMode};
use courier_sync::services::fleet::{
    CashBalanceEntry, CourierDetail, CourierLocation, CourierPayload, DeliveryStatus,
    EarningsEntry, MetricsEntry,
};
use courier_sync::services::mirror::{MirrorCell, MirrorTable};
use courier_sync::services::{
    build_scheduler, AuthApi, Collaborators, CollectorSettings, DataCollector, DistanceApi,
    FleetApi, HotspotService, HotspotSource, IdleTracker, MirrorSystem, RateLimiter, Scheduler,
    TokenManager,
};
use courier_sync::time_utils::{Clock, ManualClock};
use courier_sync::AppState;
use geo::Point;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Check if emulator is available via environment variable.
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Monday 2025-06-02 12:00 in Budapest (UTC+2), inside operating hours.
pub fn midday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap()
}

/// 2025-06-02 23:30 in Budapest, outside operating hours.
pub fn late_night() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 21, 30, 0).unwrap()
}

/// Budapest local midnight of 2025-06-02, epoch ms.
pub fn today_bucket() -> i64 {
    Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0)
        .unwrap()
        .timestamp_millis()
}

/// Budapest local midnight of 2025-06-01, epoch ms.
pub fn yesterday_bucket() -> i64 {
    Utc.with_ymd_and_hms(2025, 5, 31, 22, 0, 0)
        .unwrap()
        .timestamp_millis()
}

// ─── Fleet ───────────────────────────────────────────────────────────────────

/// Scripted fleet API with per-endpoint call counters.
#[derive(Default)]
pub struct FakeFleet {
    pub couriers: Mutex<Vec<CourierPayload>>,
    pub details: Mutex<HashMap<u64, CourierDetail>>,
    pub metrics: Mutex<Vec<MetricsEntry>>,
    pub earnings: Mutex<Vec<EarningsEntry>>,
    pub cash_balances: Mutex<Vec<CashBalanceEntry>>,
    pub statuses: Mutex<Vec<DeliveryStatus>>,
    pub locations: Mutex<Vec<CourierLocation>>,

    pub roster_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub metrics_calls: AtomicUsize,
    pub earnings_calls: AtomicUsize,
    pub cash_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub location_calls: AtomicUsize,

    pub fail_roster: AtomicBool,
    pub fail_metrics: AtomicBool,
    /// When set, the roster fetch waits for a notification before answering
    pub roster_gate: Mutex<Option<Arc<Notify>>>,
    /// Metrics windows requested, as (from, to)
    pub metric_windows: Mutex<Vec<(i64, i64)>>,
}

impl FakeFleet {
    pub fn total_calls(&self) -> usize {
        [
            &self.roster_calls,
            &self.detail_calls,
            &self.metrics_calls,
            &self.earnings_calls,
            &self.cash_calls,
            &self.status_calls,
            &self.location_calls,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }

    pub fn set_roster(&self, values: Vec<serde_json::Value>) {
        *self.couriers.lock().unwrap() = decode(values);
    }

    pub fn set_metrics(&self, values: Vec<serde_json::Value>) {
        *self.metrics.lock().unwrap() = decode(values);
    }

    pub fn set_earnings(&self, values: Vec<serde_json::Value>) {
        *self.earnings.lock().unwrap() = decode(values);
    }

    pub fn set_cash_balances(&self, values: Vec<serde_json::Value>) {
        *self.cash_balances.lock().unwrap() = decode(values);
    }

    pub fn set_statuses(&self, values: Vec<serde_json::Value>) {
        *self.statuses.lock().unwrap() = decode(values);
    }

    pub fn set_locations(&self, values: Vec<serde_json::Value>) {
        *self.locations.lock().unwrap() = decode(values);
    }

    pub fn set_detail(&self, courier_id: u64, team: &str) {
        self.details.lock().unwrap().insert(
            courier_id,
            CourierDetail {
                id: Some(courier_id),
                team: Some(team.to_string()),
            },
        );
    }

    pub fn gate_roster(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.roster_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

fn decode<T: serde::de::DeserializeOwned>(values: Vec<serde_json::Value>) -> Vec<T> {
    values
        .into_iter()
        .map(|v| serde_json::from_value(v).expect("test fixture should decode"))
        .collect()
}

#[async_trait]
impl FleetApi for FakeFleet {
    async fn list_couriers(&self, _token: &str) -> Result<Vec<CourierPayload>, AppError> {
        self.roster_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.roster_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_roster.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamFetch(AppError::RATE_LIMITED.to_string()));
        }
        Ok(self.couriers.lock().unwrap().clone())
    }

    async fn get_courier_detail(
        &self,
        _token: &str,
        courier_id: u64,
    ) -> Result<CourierDetail, AppError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.details
            .lock()
            .unwrap()
            .get(&courier_id)
            .cloned()
            .ok_or_else(|| AppError::UpstreamFetch(format!("HTTP 404: courier {}", courier_id)))
    }

    async fn get_delivery_statuses(
        &self,
        _token: &str,
        _updated_after: i64,
    ) -> Result<Vec<DeliveryStatus>, AppError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.statuses.lock().unwrap().clone())
    }

    async fn get_locations(
        &self,
        _token: &str,
        _updated_after: i64,
    ) -> Result<Vec<CourierLocation>, AppError> {
        self.location_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.locations.lock().unwrap().clone())
    }

    async fn get_metrics(
        &self,
        _token: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<MetricsEntry>, AppError> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        self.metric_windows.lock().unwrap().push((from, to));
        if self.fail_metrics.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamFetch("HTTP 500: boom".to_string()));
        }
        Ok(self.metrics.lock().unwrap().clone())
    }

    async fn get_earnings(
        &self,
        _token: &str,
        _from: i64,
        _to: i64,
    ) -> Result<Vec<EarningsEntry>, AppError> {
        self.earnings_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.earnings.lock().unwrap().clone())
    }

    async fn get_cash_balances(&self, _token: &str) -> Result<Vec<CashBalanceEntry>, AppError> {
        self.cash_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.cash_balances.lock().unwrap().clone())
    }
}

// ─── Auth ────────────────────────────────────────────────────────────────────

/// Token endpoint that hands out numbered grants.
pub struct FakeAuth {
    pub exchanges: AtomicUsize,
    pub used_refresh_tokens: Mutex<Vec<String>>,
    pub fail: AtomicBool,
    pub expires_in: i64,
    /// Simulated latency so concurrent callers overlap
    pub latency: std::time::Duration,
}

impl Default for FakeAuth {
    fn default() -> Self {
        Self {
            exchanges: AtomicUsize::new(0),
            used_refresh_tokens: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            expires_in: 3600,
            latency: std::time::Duration::ZERO,
        }
    }
}

impl FakeAuth {
    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for FakeAuth {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Auth("HTTP 400: invalid_grant".to_string()));
        }
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        self.used_refresh_tokens
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        Ok(TokenGrant {
            access_token: format!("access-{}", n),
            refresh_token: format!("refresh-{}", n),
            expires_in: self.expires_in,
        })
    }
}

// ─── Distance ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeDistance {
    pub elements: Mutex<Vec<DistanceElement>>,
    pub calls: AtomicUsize,
    pub last_destinations: Mutex<Vec<Point<f64>>>,
}

impl FakeDistance {
    pub fn respond_with(&self, elements: Vec<DistanceElement>) {
        *self.elements.lock().unwrap() = elements;
    }
}

#[async_trait]
impl DistanceApi for FakeDistance {
    async fn matrix(
        &self,
        _origin: Point<f64>,
        destinations: &[Point<f64>],
        mode: TravelMode,
    ) -> Result<Vec<DistanceElement>, AppError> {
        assert_eq!(mode, TravelMode::Bicycling);
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_destinations.lock().unwrap() = destinations.to_vec();
        Ok(self.elements.lock().unwrap().clone())
    }
}

// ─── Mirror ──────────────────────────────────────────────────────────────────

/// Records every mirror write; can be switched to fail.
#[derive(Default)]
pub struct FakeMirror {
    pub added: Mutex<Vec<(MirrorTable, Vec<MirrorCell>)>>,
    pub updated: Mutex<Vec<(MirrorTable, String, Vec<MirrorCell>)>>,
    pub fail: AtomicBool,
}

impl FakeMirror {
    pub fn added_count(&self) -> usize {
        self.added.lock().unwrap().len()
    }

    pub fn updates(&self) -> Vec<(MirrorTable, String, Vec<MirrorCell>)> {
        self.updated.lock().unwrap().clone()
    }
}

#[async_trait]
impl MirrorSystem for FakeMirror {
    async fn add_row(&self, table: MirrorTable, cells: Vec<MirrorCell>) -> Result<String, AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::MirrorWrite("HTTP 503: unavailable".to_string()));
        }
        let mut added = self.added.lock().unwrap();
        added.push((table, cells));
        Ok(format!("row-{}", added.len()))
    }

    async fn update_row(
        &self,
        table: MirrorTable,
        row_id: &str,
        cells: Vec<MirrorCell>,
    ) -> Result<(), AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::MirrorWrite("HTTP 503: unavailable".to_string()));
        }
        self.updated
            .lock()
            .unwrap()
            .push((table, row_id.to_string(), cells));
        Ok(())
    }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

/// Engine wired to fakes, an in-memory store and a manual clock.
pub struct Harness {
    pub config: Config,
    pub store: Arc<MemoryDb>,
    pub fleet: Arc<FakeFleet>,
    pub auth: Arc<FakeAuth>,
    pub distance: Arc<FakeDistance>,
    pub mirror: Arc<FakeMirror>,
    pub clock: Arc<ManualClock>,
    pub hotspots: HotspotService,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_auth(now, FakeAuth::default())
    }

    pub fn with_auth(now: DateTime<Utc>, auth: FakeAuth) -> Self {
        Self {
            config: Config::test_default(),
            store: Arc::new(MemoryDb::new()),
            fleet: Arc::new(FakeFleet::default()),
            auth: Arc::new(auth),
            distance: Arc::new(FakeDistance::default()),
            mirror: Arc::new(FakeMirror::default()),
            clock: Arc::new(ManualClock::new(now)),
            hotspots: HotspotService::default(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            store: self.store.clone(),
            fleet: self.fleet.clone(),
            auth: self.auth.clone(),
            distance: self.distance.clone(),
            mirror: self.mirror.clone(),
            hotspots: Arc::new(self.hotspots.clone()) as Arc<dyn HotspotSource>,
            clock: self.clock.clone(),
        }
    }

    pub fn token_manager(&self) -> Arc<TokenManager> {
        Arc::new(TokenManager::new(
            self.auth.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.config.fleet.bootstrap_refresh_token.clone(),
        ))
    }

    pub fn collector(&self) -> DataCollector {
        DataCollector::new(
            self.fleet.clone(),
            self.token_manager(),
            self.store.clone(),
            self.mirror.clone(),
            self.clock.clone(),
            CollectorSettings::from_config(&self.config),
        )
    }

    pub fn tracker(&self) -> IdleTracker {
        IdleTracker::new(
            self.fleet.clone(),
            self.token_manager(),
            self.store.clone(),
            self.distance.clone(),
            self.mirror.clone(),
            Arc::new(self.hotspots.clone()),
            self.clock.clone(),
            RateLimiter::disabled(),
        )
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        build_scheduler(&self.config, self.collaborators())
    }

    /// Store a token valid for another hour.
    pub async fn seed_valid_token(&self) {
        let now = self.clock.now();
        self.store
            .replace_token(&AuthToken {
                access_token: "seeded-access".to_string(),
                refresh_token: "seeded-refresh".to_string(),
                expires_at: now + Duration::hours(1),
                updated_at: now,
            })
            .await
            .unwrap();
    }
}

/// Create a test app over fakes. Returns the router, the shared state and
/// the harness the scheduler was built from.
pub fn create_test_app(config: Config) -> (axum::Router, Arc<AppState>, Harness) {
    let mut harness = Harness::new(midday());
    harness.config = config;

    let scheduler = harness.scheduler();
    let db: Arc<dyn Store> = harness.store.clone();
    let state = Arc::new(AppState {
        config: harness.config.clone(),
        db,
        scheduler,
    });

    (create_router(state.clone()), state, harness)
}

/// Poll `cond` until it holds or a second passes.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    cond()
}
