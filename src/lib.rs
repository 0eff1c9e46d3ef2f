pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod distance;
pub mod jwt;
pub mod rate_limit;

use api::{DistanceStrategies, create_api_router, panic_response};
use auth::{AuthError, TokenService};
use axum::{Router, middleware, response::Response};
use db::Database;
use distance::{
    DistanceStrategy, HaversineDistance, MatrixDistance, RegistryGeocoder, UpstreamConfig,
    upstream_client,
};
use jwt::JwtConfig;
use rate_limit::{
    RateLimitConfig, RateLimitSettings, enforce_rate_limit, rate_limit_headers,
    spawn_prune_scheduler,
};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens; the refresh token hashing key is derived from it
    pub jwt_secret: Vec<u8>,
    /// Google Maps API, required for `/api/pincode/distance`
    pub maps: Option<UpstreamConfig>,
    /// Post-office registry API, required for `/api/pincode/distancev2`
    pub registry: Option<UpstreamConfig>,
    /// Timeout applied to each outbound API call
    pub upstream_timeout: Duration,
    pub rate_limit: RateLimitSettings,
    /// Whether to take the client address from `X-Real-IP` (requires running behind a proxy)
    pub trust_real_ip: bool,
}

/// Failures while assembling the application.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to build upstream client: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("failed to set up token service: {0}")]
    Auth(#[from] AuthError),
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Request handler panicked");
    panic_response()
}

fn build_strategies(config: &ServerConfig) -> Result<DistanceStrategies, reqwest::Error> {
    let matrix = match &config.maps {
        Some(maps) => {
            let client = upstream_client(config.upstream_timeout)?;
            Some(Arc::new(MatrixDistance::new(client, maps.clone())) as Arc<dyn DistanceStrategy>)
        }
        None => None,
    };

    let haversine = match &config.registry {
        Some(registry) => {
            let client = upstream_client(config.upstream_timeout)?;
            let geocoder = RegistryGeocoder::new(client, registry.clone());
            Some(Arc::new(HaversineDistance::new(geocoder)) as Arc<dyn DistanceStrategy>)
        }
        None => None,
    };

    Ok(DistanceStrategies { matrix, haversine })
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, StartupError> {
    build_app(config).map(|(app, _)| app)
}

/// Build the router and return the rate limiter state it shares, so the
/// caller can schedule pruning.
fn build_app(config: &ServerConfig) -> Result<(Router, Arc<RateLimitConfig>), StartupError> {
    let jwt = Arc::new(JwtConfig::new(&config.jwt_secret));
    let tokens = Arc::new(TokenService::new(
        config.db.clone(),
        jwt,
        &config.jwt_secret,
    )?);

    let strategies = build_strategies(config)?;
    let rate_limit = Arc::new(RateLimitConfig::new(
        &config.rate_limit,
        config.trust_real_ip,
    ));

    let app = Router::new()
        .nest("/api", create_api_router(tokens, strategies))
        .layer(middleware::from_fn(rate_limit_headers))
        .layer(middleware::from_fn_with_state(
            rate_limit.clone(),
            enforce_rate_limit,
        ))
        .layer(CatchPanicLayer::custom(handle_panic));

    Ok((app, rate_limit))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let (app, rate_limit) = build_app(&config).map_err(std::io::Error::other)?;
    let pruner = spawn_prune_scheduler(rate_limit);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let result = axum::serve(listener, make_service).await;
    pruner.abort();
    result
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
