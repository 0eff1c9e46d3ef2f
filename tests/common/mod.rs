#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use pindistance::{
    ServerConfig, create_app,
    auth::hash_password,
    db::Database,
    distance::UpstreamConfig,
    jwt::AccessClaims,
    rate_limit::RateLimitSettings,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";
pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "correct horse battery staple";

/// Settings that never throttle oneshot requests, which have no peer address.
pub fn unthrottled() -> RateLimitSettings {
    RateLimitSettings {
        whitelist: vec!["unknown".to_string()],
        ..RateLimitSettings::default()
    }
}

pub fn test_config(db: Database) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: JWT_SECRET.to_vec(),
        maps: None,
        registry: None,
        upstream_timeout: Duration::from_secs(5),
        rate_limit: unthrottled(),
        trust_real_ip: false,
    }
}

pub async fn test_db() -> Database {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let hash = hash_password(PASSWORD).expect("Failed to hash password");
    db.users()
        .create(USERNAME, &hash)
        .await
        .expect("Failed to create user");
    db
}

/// App with one user and no distance strategies.
pub async fn create_test_app() -> (Router, Database) {
    let db = test_db().await;
    let app = create_app(&test_config(db.clone())).expect("Failed to build app");
    (app, db)
}

pub async fn create_app_with(config: ServerConfig) -> Router {
    create_app(&config).expect("Failed to build app")
}

pub fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer_json_request(uri: &str, token: &str, body: Value) -> Request<Body> {
    let mut request = json_request(uri, body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token).parse().unwrap(),
    );
    request
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn read_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn read_text(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

pub struct Tokens {
    pub token: String,
    pub refresh_token: String,
}

/// Log in as the test user and return the issued pair.
pub async fn login(app: &Router) -> Tokens {
    let response = send(
        app,
        json_request(
            "/api/auth/login",
            serde_json::json!({"username": USERNAME, "password": PASSWORD}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    Tokens {
        token: json["token"].as_str().unwrap().to_string(),
        refresh_token: json["refreshToken"].as_str().unwrap().to_string(),
    }
}

/// A correctly signed access token that expired an hour ago.
pub fn expired_access_token(username: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = AccessClaims {
        sub: username.to_string(),
        iat: now - 7200,
        exp: now - 3600,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET),
    )
    .unwrap()
}

/// Serve `router` on an ephemeral local port, standing in for a third-party API.
pub async fn spawn_upstream(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    addr
}

pub fn upstream(addr: SocketAddr, path: &str) -> UpstreamConfig {
    UpstreamConfig::new(format!("http://{}{}", addr, path), "test-api-key")
}
