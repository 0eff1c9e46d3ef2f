mod common;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    body::Body,
    extract::Query,
    http::{Request, StatusCode},
    routing::get,
};
use common::*;
use pindistance::distance::{Coordinates, rounded_km};
use serde_json::{Value, json};

const DELHI: (f64, f64) = (28.6139, 77.2090);
const MUMBAI: (f64, f64) = (19.0760, 72.8777);

/// Stand-in for the post-office registry: two known pincodes, an outage on `500000`.
async fn registry_handler(
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if params.get("api-key").map(String::as_str) != Some("test-api-key") {
        return Err(StatusCode::FORBIDDEN);
    }
    let pincode = params.get("filters[pincode]").cloned().unwrap_or_default();
    let records = match pincode.as_str() {
        "110001" => json!([
            {"officename": "Connaught Place S.O", "officetype": "SO", "latitude": "1.0", "longitude": "1.0"},
            {"officename": "New Delhi G.P.O.", "officetype": "PO", "latitude": DELHI.0.to_string(), "longitude": DELHI.1}
        ]),
        "400001" => json!([
            {"officename": "Mumbai G.P.O.", "officetype": "HO", "latitude": MUMBAI.0, "longitude": MUMBAI.1.to_string()}
        ]),
        "123456" => json!([
            {"officename": "Nowhere B.O", "officetype": "BO", "latitude": "NA", "longitude": "NA"}
        ]),
        "500000" => return Err(StatusCode::INTERNAL_SERVER_ERROR),
        _ => json!([]),
    };
    Ok(Json(json!({"status": "ok", "records": records})))
}

async fn geocode_handler(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let components = params.get("components").cloned().unwrap_or_default();
    let location = match components.as_str() {
        "postal_code:110001|country:IN" => Some(DELHI),
        "postal_code:400001|country:IN" => Some(MUMBAI),
        _ => None,
    };
    match location {
        Some((lat, lng)) => Json(json!({
            "status": "OK",
            "results": [{"geometry": {"location": {"lat": lat, "lng": lng}}}]
        })),
        None => Json(json!({"status": "ZERO_RESULTS", "results": []})),
    }
}

async fn matrix_handler(
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if params.get("key").map(String::as_str) != Some("test-api-key")
        || !params.contains_key("origins")
        || !params.contains_key("destinations")
    {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(json!({
        "status": "OK",
        "rows": [{"elements": [{
            "status": "OK",
            "distance": {"text": "1,421 km", "value": 1421493},
            "duration": {"text": "1 day 1 hour", "value": 90000}
        }]}]
    })))
}

async fn distance_app() -> (axum::Router, Tokens) {
    let registry = spawn_upstream(Router::new().route("/registry", get(registry_handler))).await;
    let maps = spawn_upstream(
        Router::new()
            .route("/maps/api/geocode/json", get(geocode_handler))
            .route("/maps/api/distancematrix/json", get(matrix_handler)),
    )
    .await;

    let mut config = test_config(test_db().await);
    config.registry = Some(upstream(registry, "/registry"));
    config.maps = Some(upstream(maps, "/maps/api"));

    let app = create_app_with(config).await;
    let tokens = login(&app).await;
    (app, tokens)
}

fn pincodes(origin: &str, destination: &str) -> Value {
    json!({"originPincode": origin, "destinationPincode": destination})
}

#[tokio::test]
async fn test_distance_v2_between_pincodes() {
    let (app, tokens) = distance_app().await;

    let response = send(
        &app,
        bearer_json_request(
            "/api/pincode/distancev2",
            &tokens.token,
            pincodes("110001", "400001"),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-rate-limit-limit").is_some());
    assert!(response.headers().get("x-rate-limit-remaining").is_some());
    assert!(response.headers().get("x-rate-limit-reset").is_some());

    let json = read_json(response).await;
    let expected = rounded_km(
        Coordinates::new(DELHI.0, DELHI.1),
        Coordinates::new(MUMBAI.0, MUMBAI.1),
    );
    assert_eq!(json["distance"], expected);
    assert_eq!(json["distanceUnit"], "km");
    assert_eq!(json["status"]["code"], 200);
    assert_eq!(json["status"]["text"], "success");
    assert!(json.get("duration").is_none());
}

#[tokio::test]
async fn test_distance_v2_same_pincode_is_zero() {
    let (app, tokens) = distance_app().await;

    let response = send(
        &app,
        bearer_json_request(
            "/api/pincode/distancev2",
            &tokens.token,
            pincodes("110001", "110001"),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["distance"], 0);
}

#[tokio::test]
async fn test_distance_v2_names_the_invalid_pincode() {
    let (app, tokens) = distance_app().await;

    for (origin, destination, bad) in [
        ("000000", "400001", "000000"),
        ("110001", "999999", "999999"),
        ("123456", "400001", "123456"),
        ("500000", "400001", "500000"),
    ] {
        let response = send(
            &app,
            bearer_json_request(
                "/api/pincode/distancev2",
                &tokens.token,
                pincodes(origin, destination),
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = read_json(response).await;
        assert_eq!(json["message"], format!("Invalid Pincode: {}", bad));
        assert_eq!(json["status"]["code"], 400);
    }
}

#[tokio::test]
async fn test_distance_v2_missing_pincode() {
    let (app, tokens) = distance_app().await;

    let response = send(
        &app,
        bearer_json_request(
            "/api/pincode/distancev2",
            &tokens.token,
            json!({"originPincode": "110001", "destinationPincode": "  "}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert_eq!(
        json["message"],
        "Origin and destination pincodes are required."
    );
}

#[tokio::test]
async fn test_distance_requires_bearer() {
    let (app, _tokens) = distance_app().await;

    for uri in ["/api/pincode/distance", "/api/pincode/distancev2"] {
        let response = send(&app, json_request(uri, pincodes("110001", "400001"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get("x-rate-limit-limit").is_none());
    }
}

#[tokio::test]
async fn test_distance_v1_uses_matrix() {
    let (app, tokens) = distance_app().await;

    let response = send(
        &app,
        bearer_json_request(
            "/api/pincode/distance",
            &tokens.token,
            json!({"OriginPincode": "110001", "DestinationPincode": "400001"}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["distance"], 1421);
    assert_eq!(json["duration"], "1 day 1 hour");
    assert_eq!(json["distanceUnit"], "km");
    assert_eq!(json["status"]["code"], 200);
}

#[tokio::test]
async fn test_distance_v1_lookup_failure() {
    let (app, tokens) = distance_app().await;

    let response = send(
        &app,
        bearer_json_request(
            "/api/pincode/distance",
            &tokens.token,
            pincodes("110001", "999999"),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert_eq!(
        json["message"],
        "Could not calculate distance. Check pincodes or API availability."
    );
}

#[tokio::test]
async fn test_distance_v1_upstream_unreachable() {
    // Bind and drop a listener to get a port nobody is serving.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = test_config(test_db().await);
    config.maps = Some(upstream(addr, "/maps/api"));
    let app = create_app_with(config).await;
    let tokens = login(&app).await;

    let response = send(
        &app,
        bearer_json_request(
            "/api/pincode/distance",
            &tokens.token,
            pincodes("110001", "400001"),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_distance_without_configured_strategy() {
    let (app, _db) = create_test_app().await;
    let tokens = login(&app).await;

    for uri in ["/api/pincode/distance", "/api/pincode/distancev2"] {
        let response = send(
            &app,
            bearer_json_request(uri, &tokens.token, pincodes("110001", "400001")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = read_json(response).await;
        assert_eq!(json["status"]["code"], 500);
    }
}

#[tokio::test]
async fn test_distance_rejects_non_json_body() {
    let (app, tokens) = distance_app().await;

    let response = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/pincode/distancev2")
            .header("Authorization", format!("Bearer {}", tokens.token))
            .body(Body::from("origin=110001"))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_distance_v2_hung_registry_times_out() {
    async fn hung_registry() -> Json<Value> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Json(json!({"status": "ok", "records": []}))
    }

    let registry = spawn_upstream(Router::new().route("/registry", get(hung_registry))).await;
    let mut config = test_config(test_db().await);
    config.registry = Some(upstream(registry, "/registry"));
    config.upstream_timeout = Duration::from_secs(1);
    let app = create_app_with(config).await;
    let tokens = login(&app).await;

    let started = Instant::now();
    let response = send(
        &app,
        bearer_json_request(
            "/api/pincode/distancev2",
            &tokens.token,
            pincodes("110001", "400001"),
        ),
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert_eq!(json["message"], "Invalid Pincode: 110001");
}
