//! Pincode distance API endpoints.
//!
//! - POST `/distance` - Road distance and travel time via the maps provider
//! - POST `/distancev2` - Straight-line distance via the post-office registry

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::error::{ApiError, ApiJson, StatusBody, non_blank};
use crate::auth::{BearerAuth, TokenService};
use crate::distance::{DistanceError, DistanceStrategy};
use crate::impl_has_auth_backend;

const LOOKUP_FAILED: &str = "Could not calculate distance. Check pincodes or API availability.";

#[derive(Clone)]
pub struct PincodeState {
    pub tokens: Arc<TokenService>,
    /// Backs `/distance`; absent when no maps API key is configured
    pub matrix: Option<Arc<dyn DistanceStrategy>>,
    /// Backs `/distancev2`; absent when no registry API key is configured
    pub haversine: Option<Arc<dyn DistanceStrategy>>,
}

impl_has_auth_backend!(PincodeState);

pub fn router(state: PincodeState) -> Router {
    Router::new()
        .route("/distance", post(distance))
        .route("/distancev2", post(distance_v2))
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DistanceRequest {
    #[serde(default, alias = "OriginPincode")]
    origin_pincode: Option<String>,
    #[serde(default, alias = "DestinationPincode")]
    destination_pincode: Option<String>,
}

impl DistanceRequest {
    fn pincodes(&self) -> Result<(&str, &str), ApiError> {
        match (
            non_blank(&self.origin_pincode),
            non_blank(&self.destination_pincode),
        ) {
            (Some(origin), Some(destination)) => Ok((origin, destination)),
            _ => Err(ApiError::bad_request(
                "Origin and destination pincodes are required.",
            )),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DistanceResponse {
    distance: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<String>,
    distance_unit: &'static str,
    status: StatusBody,
}

fn configured(
    strategy: &Option<Arc<dyn DistanceStrategy>>,
    name: &str,
) -> Result<Arc<dyn DistanceStrategy>, ApiError> {
    strategy.clone().ok_or_else(|| {
        error!(strategy = name, "Distance strategy is not configured");
        ApiError::internal("A severe error occurred during distance calculation.")
    })
}

async fn distance(
    State(state): State<PincodeState>,
    BearerAuth(user): BearerAuth,
    ApiJson(request): ApiJson<DistanceRequest>,
) -> Result<Json<DistanceResponse>, ApiError> {
    let (origin, destination) = request.pincodes()?;
    let matrix = configured(&state.matrix, "matrix")?;

    info!(username = %user.username(), origin = %origin, destination = %destination, "Distance requested");

    let route = matrix
        .distance(origin, destination)
        .await
        .map_err(|_| ApiError::bad_request(LOOKUP_FAILED))?;

    Ok(Json(DistanceResponse {
        distance: route.distance_km,
        duration: route.duration,
        distance_unit: "km",
        status: StatusBody::success(),
    }))
}

async fn distance_v2(
    State(state): State<PincodeState>,
    BearerAuth(user): BearerAuth,
    ApiJson(request): ApiJson<DistanceRequest>,
) -> Result<Json<DistanceResponse>, ApiError> {
    let (origin, destination) = request.pincodes()?;
    let haversine = configured(&state.haversine, "haversine")?;

    info!(username = %user.username(), origin = %origin, destination = %destination, "Distance v2 requested");

    let route = haversine
        .distance(origin, destination)
        .await
        .map_err(|e| match e {
            DistanceError::OriginNotFound(_) | DistanceError::DestinationNotFound(_) => {
                ApiError::bad_request(e.to_string())
            }
            DistanceError::Upstream(_) => ApiError::bad_request(LOOKUP_FAILED),
        })?;

    Ok(Json(DistanceResponse {
        distance: route.distance_km,
        duration: None,
        distance_unit: "km",
        status: StatusBody::success(),
    }))
}
