mod auth;
pub(crate) mod error;
mod pincode;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::auth::{TokenService, attach_rotated_tokens};
use crate::distance::DistanceStrategy;

pub use error::{ApiError, StatusBody, panic_response};

/// Distance strategies available to the pincode routes.
#[derive(Clone, Default)]
pub struct DistanceStrategies {
    pub matrix: Option<Arc<dyn DistanceStrategy>>,
    pub haversine: Option<Arc<dyn DistanceStrategy>>,
}

/// Create the API router.
pub fn create_api_router(tokens: Arc<TokenService>, strategies: DistanceStrategies) -> Router {
    let auth_state = auth::AuthState {
        tokens: tokens.clone(),
    };

    let pincode_state = pincode::PincodeState {
        tokens,
        matrix: strategies.matrix,
        haversine: strategies.haversine,
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/pincode", pincode::router(pincode_state))
        .layer(middleware::from_fn(attach_rotated_tokens))
}
