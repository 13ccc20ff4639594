// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Courier-Sync: fleet data collection and idle-courier hotspot assignment
//!
//! This crate pulls courier profiles, metrics, earnings and cash balances
//! from a fleet-management API into a store, mirrors selected fields to a
//! spreadsheet, and points idle couriers at the nearest hotspot of their team.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use services::Scheduler;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn Store>,
    pub scheduler: Arc<Scheduler>,
}
