// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Hotspot reference data.

use geo::Point;

/// A named staging point for idle couriers of one team.
#[derive(Debug, Clone, PartialEq)]
pub struct Hotspot {
    pub team: String,
    pub name: String,
    /// x = longitude, y = latitude
    pub location: Point<f64>,
}

impl Hotspot {
    pub fn lat(&self) -> f64 {
        self.location.y()
    }

    pub fn lng(&self) -> f64 {
        self.location.x()
    }

    /// Case-insensitive team match.
    pub fn belongs_to(&self, team: &str) -> bool {
        self.team.trim().to_lowercase() == team.trim().to_lowercase()
    }
}
