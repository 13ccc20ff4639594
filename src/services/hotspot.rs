// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Hotspot dataset loading and team filtering.

use crate::models::Hotspot;
use geo::Point;
use geojson::GeoJson;
use std::fs;
use std::path::{Path, PathBuf};

/// Loaded hotspot dataset.
#[derive(Debug, Default, Clone)]
pub struct HotspotService {
    hotspots: Vec<Hotspot>,
}

impl HotspotService {
    pub fn new(hotspots: Vec<Hotspot>) -> Self {
        Self { hotspots }
    }

    /// Load hotspots from a GeoJSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, HotspotError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| HotspotError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load hotspots from a GeoJSON FeatureCollection of Points.
    ///
    /// Each feature needs `team` and `name` properties; features missing
    /// either are skipped.
    pub fn load_from_json(json_data: &str) -> Result<Self, HotspotError> {
        let geojson: GeoJson = json_data
            .parse()
            .map_err(|e: geojson::Error| HotspotError::ParseError(e.to_string()))?;

        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(HotspotError::NotACollection);
        };

        let mut hotspots = Vec::new();

        for feature in collection.features {
            let team = feature
                .property("team")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .unwrap_or("")
                .to_string();
            let name = feature
                .property("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            if team.is_empty() || name.is_empty() {
                tracing::warn!(team, name, "Skipping hotspot without team or name");
                continue;
            }

            if let Some(geom) = feature.geometry {
                let location: Point<f64> = geom
                    .value
                    .try_into()
                    .map_err(|_| HotspotError::UnsupportedGeometry(name.clone()))?;
                hotspots.push(Hotspot {
                    team,
                    name,
                    location,
                });
            }
        }

        tracing::info!(count = hotspots.len(), "Loaded hotspots");
        Ok(Self { hotspots })
    }

    pub fn hotspots(&self) -> &[Hotspot] {
        &self.hotspots
    }

    /// Hotspots of `team`, case-insensitive, in dataset order.
    pub fn for_team(&self, team: &str) -> Vec<Hotspot> {
        self.hotspots
            .iter()
            .filter(|h| h.belongs_to(team))
            .cloned()
            .collect()
    }
}

/// Where the tracker gets its dataset each run.
pub trait HotspotSource: Send + Sync {
    fn load(&self) -> Result<HotspotService, HotspotError>;
}

/// Re-reads a GeoJSON file on every load.
#[derive(Debug, Clone)]
pub struct FileHotspotSource {
    path: PathBuf,
}

impl FileHotspotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HotspotSource for FileHotspotSource {
    fn load(&self) -> Result<HotspotService, HotspotError> {
        HotspotService::load_from_file(&self.path)
    }
}

impl HotspotSource for HotspotService {
    fn load(&self) -> Result<HotspotService, HotspotError> {
        Ok(self.clone())
    }
}

/// Errors from hotspot loading.
#[derive(Debug, thiserror::Error)]
pub enum HotspotError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse GeoJSON: {0}")]
    ParseError(String),

    #[error("Expected a GeoJSON FeatureCollection")]
    NotACollection,

    #[error("Hotspot {0} is not a Point")]
    UnsupportedGeometry(String),
}
