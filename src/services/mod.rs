// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod auth;
pub mod collector;
pub mod distance;
pub mod fleet;
pub mod hotspot;
pub mod http;
pub mod mirror;
pub mod rate_limit;
pub mod scheduler;
pub mod tracking;

pub use auth::{AuthApi, AuthClient, TokenManager};
pub use collector::{CollectionReport, CollectorSettings, DataCollector};
pub use distance::{DistanceApi, DistanceClient};
pub use fleet::{FleetApi, FleetClient};
pub use hotspot::{FileHotspotSource, HotspotService, HotspotSource};
pub use mirror::{CodaClient, DisabledMirror, MirrorSystem};
pub use rate_limit::RateLimiter;
pub use scheduler::{RunOutcome, Scheduler};
pub use tracking::{IdleTracker, TrackingReport};

use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::time_utils::Clock;

/// External collaborators the engine is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub fleet: Arc<dyn FleetApi>,
    pub auth: Arc<dyn AuthApi>,
    pub distance: Arc<dyn DistanceApi>,
    pub mirror: Arc<dyn MirrorSystem>,
    pub hotspots: Arc<dyn HotspotSource>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Production HTTP clients for everything except the store.
    pub fn from_config(config: &Config, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let timeout = config.http_timeout();

        let mirror: Arc<dyn MirrorSystem> = match &config.mirror {
            Some(mirror) => Arc::new(CodaClient::new(mirror, timeout)),
            None => {
                tracing::warn!("Mirror credentials not set, mirror writes disabled");
                Arc::new(DisabledMirror)
            }
        };

        Self {
            store,
            fleet: Arc::new(FleetClient::new(&config.fleet, timeout)),
            auth: Arc::new(AuthClient::new(config.fleet.auth_url.clone(), timeout)),
            distance: Arc::new(DistanceClient::new(&config.distance, timeout)),
            mirror,
            hotspots: Arc::new(FileHotspotSource::new(&config.hotspots_path)),
            clock,
        }
    }
}

/// Wire token manager, collector and tracker into a scheduler.
pub fn build_scheduler(config: &Config, deps: Collaborators) -> Arc<Scheduler> {
    let tokens = Arc::new(TokenManager::new(
        deps.auth,
        deps.store.clone(),
        deps.clock.clone(),
        config.fleet.bootstrap_refresh_token.clone(),
    ));

    let collector = Arc::new(DataCollector::new(
        deps.fleet.clone(),
        tokens.clone(),
        deps.store.clone(),
        deps.mirror.clone(),
        deps.clock.clone(),
        CollectorSettings::from_config(config),
    ));

    let tracker = Arc::new(IdleTracker::new(
        deps.fleet,
        tokens,
        deps.store,
        deps.distance,
        deps.mirror,
        deps.hotspots,
        deps.clock.clone(),
        RateLimiter::from_millis(config.tracking_delay_ms),
    ));

    Arc::new(Scheduler::new(collector, tracker, deps.clock, config.timezone))
}
