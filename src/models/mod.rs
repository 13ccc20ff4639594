// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod courier;
pub mod hotspot;
pub mod stats;
pub mod token;

pub use courier::Courier;
pub use hotspot::Hotspot;
pub use stats::{CashBalance, DailyCourierStats, Earning, MetricValue, StatsUpdate};
pub use token::AuthToken;
