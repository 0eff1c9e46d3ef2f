mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use pindistance::rate_limit::RateLimitSettings;
use serde_json::json;

/// App that trusts `X-Real-IP` and allows two requests per minute.
async fn throttled_app() -> Router {
    let mut config = test_config(test_db().await);
    config.trust_real_ip = true;
    config.rate_limit = RateLimitSettings {
        per_minute: 2,
        per_five_minutes: 20,
        whitelist: vec!["127.0.0.1".to_string()],
    };
    create_app_with(config).await
}

fn probe(ip: &str) -> Request<Body> {
    Request::builder()
        .uri("/api/pincode/distancev2")
        .method("POST")
        .header("X-Real-IP", ip)
        .header("Content-Type", "application/json")
        .body(Body::from("{}"))
        .unwrap()
}

fn header(response: &axum::http::Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .map(|v| v.to_str().unwrap().to_string())
}

#[tokio::test]
async fn test_exceeding_per_minute_budget() {
    let app = throttled_app().await;

    for _ in 0..2 {
        let response = send(&app, probe("10.1.1.1")).await;
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    let response = send(&app, probe("10.1.1.1")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(header(&response, "retry-after").is_some());

    let json = read_json(response).await;
    assert_eq!(json["statusCode"], 429);
    assert_eq!(
        json["message"],
        "Too Many Requests. You have exceeded your rate limit."
    );
    assert_eq!(json["details"]["limit"], "2");
    assert_eq!(json["details"]["period"], "60s");
    assert!(json["details"]["retryAfter"].as_str().unwrap().ends_with('s'));

    // Other clients keep their own budget.
    let other = send(&app, probe("10.1.1.2")).await;
    assert_ne!(other.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_whitelisted_client_is_never_throttled() {
    let app = throttled_app().await;

    for _ in 0..10 {
        let response = send(&app, probe("127.0.0.1")).await;
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}

#[tokio::test]
async fn test_headers_track_remaining_budget() {
    let app = throttled_app().await;
    let tokens = login(&app).await;

    let mut request = bearer_json_request(
        "/api/pincode/distancev2",
        &tokens.token,
        json!({"originPincode": "110001"}),
    );
    request
        .headers_mut()
        .insert("X-Real-IP", "10.2.2.2".parse().unwrap());

    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&response, "x-rate-limit-limit").as_deref(), Some("2"));
    assert_eq!(
        header(&response, "x-rate-limit-remaining").as_deref(),
        Some("1")
    );
    let reset = header(&response, "x-rate-limit-reset").unwrap();
    let reset = chrono::DateTime::parse_from_rfc3339(&reset).unwrap();
    assert!(reset > chrono::Utc::now());
}

#[tokio::test]
async fn test_login_and_unauthorized_responses_have_no_headers() {
    let app = throttled_app().await;

    let login = send(
        &app,
        {
            let mut request = json_request(
                "/api/auth/login",
                json!({"username": USERNAME, "password": PASSWORD}),
            );
            request
                .headers_mut()
                .insert("X-Real-IP", "10.3.3.3".parse().unwrap());
            request
        },
    )
    .await;
    assert_eq!(login.status(), StatusCode::OK);
    assert!(header(&login, "x-rate-limit-limit").is_none());

    let unauthorized = send(&app, probe("10.3.3.3")).await;
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
    assert!(header(&unauthorized, "x-rate-limit-limit").is_none());
    assert!(header(&unauthorized, "x-rate-limit-remaining").is_none());
}

#[tokio::test]
async fn test_real_ip_ignored_unless_trusted() {
    let mut config = test_config(test_db().await);
    config.rate_limit = RateLimitSettings {
        per_minute: 1,
        per_five_minutes: 20,
        whitelist: vec!["127.0.0.1".to_string()],
    };
    let app = create_app_with(config).await;

    // Without trust, both requests come from the same "unknown" client.
    let first = send(&app, probe("127.0.0.1")).await;
    assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);
    let second = send(&app, probe("127.0.0.1")).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}
