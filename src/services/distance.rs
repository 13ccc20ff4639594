// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Road-network distance lookups (Google Distance Matrix style).

use async_trait::async_trait;
use geo::Point;
use serde::Deserialize;
use std::time::Duration;

use crate::config::DistanceConfig;
use crate::error::AppError;
use crate::services::http::{build_client, check_response_json, Upstream};

/// Travel mode sent to the distance service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelMode {
    Bicycling,
    Driving,
    Walking,
}

impl TravelMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Bicycling => "bicycling",
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
        }
    }
}

/// Result for one destination, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceElement {
    pub status: String,
    pub distance_meters: Option<f64>,
}

impl DistanceElement {
    pub fn ok(meters: f64) -> Self {
        Self {
            status: "OK".to_string(),
            distance_meters: Some(meters),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}

#[async_trait]
pub trait DistanceApi: Send + Sync {
    /// One row of distances from `origin` to each destination.
    async fn matrix(
        &self,
        origin: Point<f64>,
        destinations: &[Point<f64>],
        mode: TravelMode,
    ) -> Result<Vec<DistanceElement>, AppError>;
}

#[derive(Clone)]
pub struct DistanceClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl DistanceClient {
    pub fn new(config: &DistanceConfig, timeout: Duration) -> Self {
        Self {
            http: build_client(timeout),
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

/// `lat,lng` as the service expects.
fn format_point(p: &Point<f64>) -> String {
    format!("{},{}", p.y(), p.x())
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<MatrixValue>,
}

#[derive(Debug, Deserialize)]
struct MatrixValue {
    value: f64,
}

#[async_trait]
impl DistanceApi for DistanceClient {
    async fn matrix(
        &self,
        origin: Point<f64>,
        destinations: &[Point<f64>],
        mode: TravelMode,
    ) -> Result<Vec<DistanceElement>, AppError> {
        if destinations.is_empty() {
            return Ok(Vec::new());
        }

        let expected = destinations.len();
        let destinations = destinations
            .iter()
            .map(format_point)
            .collect::<Vec<_>>()
            .join("|");

        let mut query = vec![
            ("origins", format_point(&origin)),
            ("destinations", destinations),
            ("mode", mode.as_str().to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("key", key.clone()));
        }

        let response = self
            .http
            .get(&self.url)
            .query(&query)
            .send()
            .await
            .map_err(|e| Upstream::Distance.transport(e))?;

        let body: MatrixResponse = check_response_json(Upstream::Distance, response).await?;

        if body.status != "OK" {
            return Err(AppError::UpstreamFetch(format!(
                "Distance matrix status {}: {}",
                body.status,
                body.error_message.unwrap_or_default()
            )));
        }

        let row = body
            .rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::UpstreamFetch("Distance matrix returned no rows".to_string()))?;

        if row.elements.len() != expected {
            return Err(AppError::UpstreamFetch(format!(
                "Distance matrix returned {} elements for {} destinations",
                row.elements.len(),
                expected
            )));
        }

        Ok(row
            .elements
            .into_iter()
            .map(|e| DistanceElement {
                status: e.status,
                distance_meters: e.distance.map(|d| d.value),
            })
            .collect())
    }
}
