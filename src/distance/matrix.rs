//! Google Maps geocoding and distance matrix.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::{Coordinates, DistanceError, DistanceStrategy, Geocoder, RouteDistance, UpstreamConfig};

const STATUS_OK: &str = "OK";

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
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
    distance: Option<ValueField>,
    duration: Option<TextField>,
}

#[derive(Debug, Deserialize)]
struct ValueField {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct TextField {
    text: String,
}

/// Pincode geocoding through the Google Maps geocode API, restricted to India.
pub struct GoogleGeocoder {
    client: Client,
    config: UpstreamConfig,
}

impl GoogleGeocoder {
    pub fn new(client: Client, config: UpstreamConfig) -> Self {
        Self { client, config }
    }

    async fn fetch(&self, pincode: &str) -> Result<GeocodeResponse, reqwest::Error> {
        let components = format!("postal_code:{pincode}|country:IN");
        self.client
            .get(self.config.endpoint("geocode/json"))
            .query(&[
                ("components", components.as_str()),
                ("key", self.config.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, pincode: &str) -> Option<Coordinates> {
        let body = match self.fetch(pincode).await {
            Ok(body) => body,
            Err(e) => {
                error!(pincode = %pincode, error = %e, "Geocoding request failed");
                return None;
            }
        };

        if body.status != STATUS_OK {
            warn!(pincode = %pincode, status = %body.status, "Geocoding API returned an error");
            return None;
        }

        let location = &body.results.first()?.geometry.location;
        Some(Coordinates::new(location.lat, location.lng))
    }
}

/// Road distance from the Google distance matrix API.
pub struct MatrixDistance {
    client: Client,
    config: UpstreamConfig,
    geocoder: GoogleGeocoder,
}

impl MatrixDistance {
    pub fn new(client: Client, config: UpstreamConfig) -> Self {
        let geocoder = GoogleGeocoder::new(client.clone(), config.clone());
        Self {
            client,
            config,
            geocoder,
        }
    }

    async fn fetch(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<MatrixResponse, reqwest::Error> {
        let origins = format!("{},{}", origin.latitude, origin.longitude);
        let destinations = format!("{},{}", destination.latitude, destination.longitude);
        self.client
            .get(self.config.endpoint("distancematrix/json"))
            .query(&[
                ("origins", origins.as_str()),
                ("destinations", destinations.as_str()),
                ("key", self.config.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl DistanceStrategy for MatrixDistance {
    async fn distance(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<RouteDistance, DistanceError> {
        info!(origin = %origin, destination = %destination, "Fetching matrix distance");

        let from = self.geocoder.geocode(origin).await;
        let to = self.geocoder.geocode(destination).await;
        let (from, to) = match (from, to) {
            (Some(from), Some(to)) => (from, to),
            (None, _) => {
                warn!(origin = %origin, destination = %destination, "Geocoding failed for origin");
                return Err(DistanceError::OriginNotFound(origin.to_string()));
            }
            (_, None) => {
                warn!(origin = %origin, destination = %destination, "Geocoding failed for destination");
                return Err(DistanceError::DestinationNotFound(destination.to_string()));
            }
        };

        let body = self.fetch(from, to).await.map_err(|e| {
            error!(error = %e, "Distance matrix request failed");
            DistanceError::Upstream(e.to_string())
        })?;

        if body.status != STATUS_OK {
            error!(status = %body.status, "Distance matrix API returned an error");
            return Err(DistanceError::Upstream(format!("status {}", body.status)));
        }

        let element = body
            .rows
            .first()
            .and_then(|row| row.elements.first())
            .ok_or_else(|| DistanceError::Upstream("empty distance matrix".to_string()))?;

        let Some(distance) = &element.distance else {
            warn!("Distance matrix element has no distance");
            return Err(DistanceError::Upstream("no route between pincodes".to_string()));
        };

        let km = distance.value / 1000.0;
        let duration = element.duration.as_ref().map(|d| d.text.clone());
        info!(distance_km = km, duration = ?duration, "Distance calculated");

        Ok(RouteDistance {
            distance_km: km.round() as i64,
            duration,
        })
    }
}
