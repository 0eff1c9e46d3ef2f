//! Great-circle distance.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Coordinates, DistanceError, DistanceStrategy, Geocoder, RouteDistance};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometres.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// [`haversine_km`] rounded to the nearest whole kilometre.
pub fn rounded_km(a: Coordinates, b: Coordinates) -> i64 {
    haversine_km(a, b).round() as i64
}

/// Geocode both pincodes, then measure the straight-line distance.
pub struct HaversineDistance<G> {
    geocoder: G,
}

impl<G: Geocoder> HaversineDistance<G> {
    pub fn new(geocoder: G) -> Self {
        Self { geocoder }
    }
}

#[async_trait]
impl<G: Geocoder> DistanceStrategy for HaversineDistance<G> {
    async fn distance(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<RouteDistance, DistanceError> {
        info!(origin = %origin, destination = %destination, "Calculating haversine distance");

        let Some(from) = self.geocoder.geocode(origin).await else {
            warn!(pincode = %origin, "Origin pincode could not be geocoded");
            return Err(DistanceError::OriginNotFound(origin.to_string()));
        };
        let Some(to) = self.geocoder.geocode(destination).await else {
            warn!(pincode = %destination, "Destination pincode could not be geocoded");
            return Err(DistanceError::DestinationNotFound(destination.to_string()));
        };

        let distance_km = rounded_km(from, to);
        info!(distance_km, "Calculated distance");

        Ok(RouteDistance {
            distance_km,
            duration: None,
        })
    }
}
