//! Pincode distance calculation.
//!
//! Two interchangeable strategies sit behind [`DistanceStrategy`]:
//! - [`MatrixDistance`]: geocodes through Google Maps, then asks the
//!   distance matrix API for a road distance and travel time
//! - [`HaversineDistance`]: geocodes through the post-office registry, then
//!   computes the great-circle distance locally

mod haversine;
mod matrix;
mod registry;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

pub use haversine::{EARTH_RADIUS_KM, HaversineDistance, haversine_km, rounded_km};
pub use matrix::{GoogleGeocoder, MatrixDistance};
pub use registry::{PostOfficeRecord, RegistryGeocoder, select_post_office};

/// A resolved location in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Outcome of a successful distance lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDistance {
    /// Whole kilometres
    pub distance_km: i64,
    /// Human readable travel time, when the strategy knows one
    pub duration: Option<String>,
}

#[derive(Debug, Error)]
pub enum DistanceError {
    #[error("Invalid Pincode: {0}")]
    OriginNotFound(String),

    #[error("Invalid Pincode: {0}")]
    DestinationNotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

/// Base URL and key for a third-party API.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: String,
}

impl UpstreamConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Join `path` onto the base URL.
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Resolves a pincode to coordinates. `None` covers every failure.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, pincode: &str) -> Option<Coordinates>;
}

#[async_trait]
pub trait DistanceStrategy: Send + Sync {
    async fn distance(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<RouteDistance, DistanceError>;
}

/// Build the HTTP client shared by a strategy's outbound calls.
pub fn upstream_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("pindistance/", env!("CARGO_PKG_VERSION")))
        .build()
}
