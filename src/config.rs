// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! A `.env` file is honoured for local development. Everything except the
//! fleet company id has a default so a bare `STORE_BACKEND=memory` run works.

use chrono_tz::Tz;
use std::env;
use std::time::Duration;

pub const DEFAULT_AUTH_URL: &str = "https://authentication.wolt.com/v1/wauth2/access_token";
pub const DEFAULT_FLEET_MANAGEMENT_URL: &str = "https://fleet-management.wolt.com";
pub const DEFAULT_METRICS_URL: &str = "https://delivery-os-metrics.wolt.com";
pub const DEFAULT_EARNINGS_URL: &str = "https://delivery-os-earnings.wolt.com";
pub const DEFAULT_TRACKING_URL: &str = "https://delivery-os-tracking.wolt.com";
pub const DEFAULT_DISTANCE_MATRIX_URL: &str =
    "https://maps.googleapis.com/maps/api/distancematrix/json";
pub const DEFAULT_CODA_API_URL: &str = "https://coda.io/apis/v1";

/// Where couriers, daily stats and the auth token are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

/// Fleet-management API endpoints and credentials.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub company_id: String,
    pub auth_url: String,
    pub management_url: String,
    pub metrics_url: String,
    pub earnings_url: String,
    pub tracking_url: String,
    /// Refresh token used when the store holds none
    pub bootstrap_refresh_token: Option<String>,
}

/// Road-network distance service.
#[derive(Debug, Clone)]
pub struct DistanceConfig {
    pub url: String,
    pub api_key: Option<String>,
}

/// Spreadsheet mirror (Coda) settings. Present only when fully configured.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub api_url: String,
    pub api_token: String,
    pub doc_id: String,
    pub courier_table_id: String,
    pub hotspot_table_id: String,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    pub store_backend: StoreBackend,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Zone for the operating window, day buckets and cron triggers
    pub timezone: Tz,
    pub fleet: FleetConfig,
    pub distance: DistanceConfig,
    pub mirror: Option<MirrorConfig>,
    /// GeoJSON hotspot dataset
    pub hotspots_path: String,
    pub http_timeout_secs: u64,
    pub courier_sync_delay_ms: u64,
    pub cash_balance_delay_ms: u64,
    pub tracking_delay_ms: u64,
    /// Currency recorded when upstream omits one
    pub default_currency: String,
    /// Bearer token for the manual trigger endpoints
    pub operator_token: Option<String>,
    /// Kick off an intraday collection right after boot
    pub run_immediate_collection: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store_backend = match env_or("STORE_BACKEND", "firestore").to_lowercase().as_str() {
            "firestore" => StoreBackend::Firestore,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let timezone_name = env_or("TIMEZONE", "Europe/Budapest");
        let timezone = parse_timezone(&timezone_name)?;

        let mirror = match (
            env_opt("CODA_API_TOKEN"),
            env_opt("CODA_DOC_ID"),
            env_opt("CODA_TABLE_ID"),
        ) {
            (Some(api_token), Some(doc_id), Some(courier_table_id)) => Some(MirrorConfig {
                api_url: env_or("CODA_API_URL", DEFAULT_CODA_API_URL),
                hotspot_table_id: env_opt("CODA_HOTSPOT_TABLE_ID")
                    .unwrap_or_else(|| courier_table_id.clone()),
                api_token,
                doc_id,
                courier_table_id,
            }),
            _ => None,
        };

        Ok(Self {
            port: env_parse("PORT", 3002),
            store_backend,
            gcp_project_id: env_or("GCP_PROJECT_ID", "local-dev"),
            timezone,
            fleet: FleetConfig {
                company_id: env_opt("FLEET_COMPANY_ID")
                    .ok_or(ConfigError::Missing("FLEET_COMPANY_ID"))?,
                auth_url: env_or("FLEET_AUTH_URL", DEFAULT_AUTH_URL),
                management_url: env_or("FLEET_MANAGEMENT_URL", DEFAULT_FLEET_MANAGEMENT_URL),
                metrics_url: env_or("FLEET_METRICS_URL", DEFAULT_METRICS_URL),
                earnings_url: env_or("FLEET_EARNINGS_URL", DEFAULT_EARNINGS_URL),
                tracking_url: env_or("FLEET_TRACKING_URL", DEFAULT_TRACKING_URL),
                bootstrap_refresh_token: env_opt("FLEET_REFRESH_TOKEN"),
            },
            distance: DistanceConfig {
                url: env_or("DISTANCE_MATRIX_URL", DEFAULT_DISTANCE_MATRIX_URL),
                api_key: env_opt("GOOGLE_MAPS_API_KEY"),
            },
            mirror,
            hotspots_path: env_or("HOTSPOTS_PATH", "data/hotspots.geojson"),
            http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS", 20),
            courier_sync_delay_ms: env_parse("COURIER_SYNC_DELAY_MS", 500),
            cash_balance_delay_ms: env_parse("CASH_BALANCE_DELAY_MS", 800),
            tracking_delay_ms: env_parse("TRACKING_DELAY_MS", 500),
            default_currency: env_or("DEFAULT_CURRENCY", "HUF"),
            operator_token: env_opt("OPERATOR_TOKEN"),
            run_immediate_collection: env_parse("RUN_IMMEDIATE_COLLECTION", false),
        })
    }

    /// Deterministic config for tests: in-memory store, no delays.
    pub fn test_default() -> Self {
        Self {
            port: 3002,
            store_backend: StoreBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            timezone: chrono_tz::Europe::Budapest,
            fleet: FleetConfig {
                company_id: "test-company".to_string(),
                auth_url: DEFAULT_AUTH_URL.to_string(),
                management_url: DEFAULT_FLEET_MANAGEMENT_URL.to_string(),
                metrics_url: DEFAULT_METRICS_URL.to_string(),
                earnings_url: DEFAULT_EARNINGS_URL.to_string(),
                tracking_url: DEFAULT_TRACKING_URL.to_string(),
                bootstrap_refresh_token: Some("bootstrap-refresh".to_string()),
            },
            distance: DistanceConfig {
                url: DEFAULT_DISTANCE_MATRIX_URL.to_string(),
                api_key: Some("test-maps-key".to_string()),
            },
            mirror: None,
            hotspots_path: "data/hotspots.geojson".to_string(),
            http_timeout_secs: 5,
            courier_sync_delay_ms: 0,
            cash_balance_delay_ms: 0,
            tracking_delay_ms: 0,
            default_currency: "HUF".to_string(),
            operator_token: None,
            run_immediate_collection: false,
        }
    }

    /// Timeout applied to every outbound HTTP request.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Parse an IANA zone name such as `Europe/Budapest`.
pub fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.trim().parse::<Tz>().map_err(|_| ConfigError::Invalid {
        name: "TIMEZONE",
        value: name.to_string(),
    })
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_opt(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}
