use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use reelvault::config::Environment;
use reelvault::create_app;
use reelvault::handlers::AppState;
use reelvault::memory::InMemoryMovieRepository;
use reelvault::rate_limiter::{LimiterConfig, RateLimiter};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

fn app(limiter: LimiterConfig) -> Router {
    let state = Arc::new(AppState {
        environment: Environment::Development,
        movies: Arc::new(InMemoryMovieRepository::new()),
        rate_limiter: RateLimiter::new(limiter),
    });
    create_app(state).layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4242))))
}

fn unlimited_app() -> Router {
    app(LimiterConfig {
        enabled: false,
        ..LimiterConfig::default()
    })
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

fn inception() -> Value {
    json!({
        "title": "Inception",
        "year": 2010,
        "runtime": 148,
        "genres": ["scifi", "thriller"]
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = unlimited_app();
    let (status, _, body) = send(&app, empty_request(Method::GET, "/v1/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "available");
    assert_eq!(body["system_info"]["environment"], "development");
}

#[tokio::test]
async fn test_create_then_update_with_version_checks() {
    let app = unlimited_app();

    let (status, headers, body) =
        send(&app, json_request(Method::POST, "/v1/movies", inception())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers[header::LOCATION], "/v1/movies/1");
    assert_eq!(body["movie"]["id"], 1);
    assert_eq!(body["movie"]["version"], 1);
    assert_eq!(body["movie"]["title"], "Inception");
    assert!(body["movie"].get("created_at").is_none());

    let (status, _, body) = send(&app, empty_request(Method::GET, "/v1/movies/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["movie"]["genres"], json!(["scifi", "thriller"]));

    let stale = Request::builder()
        .method(Method::PATCH)
        .uri("/v1/movies/1")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Expected-Version", "7")
        .body(Body::from(json!({"runtime": 150}).to_string()))
        .unwrap();
    let (status, _, body) = send(&app, stale).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "edit_conflict");

    let current = Request::builder()
        .method(Method::PATCH)
        .uri("/v1/movies/1")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Expected-Version", "1")
        .body(Body::from(json!({"runtime": 150}).to_string()))
        .unwrap();
    let (status, _, body) = send(&app, current).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["movie"]["version"], 2);
    assert_eq!(body["movie"]["runtime"], 150);
    assert_eq!(body["movie"]["title"], "Inception");
}

#[tokio::test]
async fn test_update_without_expected_version_still_bumps_version() {
    let app = unlimited_app();
    send(&app, json_request(Method::POST, "/v1/movies", inception())).await;

    let (status, _, body) = send(
        &app,
        json_request(Method::PATCH, "/v1/movies/1", json!({"genres": ["scifi"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["movie"]["version"], 2);
    assert_eq!(body["movie"]["genres"], json!(["scifi"]));
}

#[tokio::test]
async fn test_invalid_movie_reports_every_field() {
    let app = unlimited_app();
    let (status, _, body) = send(
        &app,
        json_request(
            Method::POST,
            "/v1/movies",
            json!({"title": "", "year": 1990, "runtime": -1, "genres": ["a", "a"]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fields"]["title"], "must be provided");
    assert_eq!(body["fields"]["year"], "must be 2000 or later");
    assert_eq!(body["fields"]["runtime"], "must be a positive integer");
    assert_eq!(body["fields"]["genres"], "must not contain duplicate values");
}

#[tokio::test]
async fn test_invalid_patch_is_not_persisted() {
    let app = unlimited_app();
    send(&app, json_request(Method::POST, "/v1/movies", inception())).await;

    let (status, _, _) = send(
        &app,
        json_request(Method::PATCH, "/v1/movies/1", json!({"title": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, _, body) = send(&app, empty_request(Method::GET, "/v1/movies/1")).await;
    assert_eq!(body["movie"]["title"], "Inception");
    assert_eq!(body["movie"]["version"], 1);
}

#[tokio::test]
async fn test_bad_json_bodies() {
    let app = unlimited_app();

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/v1/movies")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"title\": \"Inception\""))
        .unwrap();
    let (status, _, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "body contains badly-formed JSON");

    let (status, _, body) = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/v1/movies")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "body must not be empty");

    let truncated = Request::builder()
        .method(Method::POST)
        .uri("/v1/movies")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"title\":"))
        .unwrap();
    let (_, _, body) = send(&app, truncated).await;
    assert_eq!(body["message"], "body contains badly-formed JSON");

    let (status, _, _) = send(
        &app,
        json_request(Method::POST, "/v1/movies", json!({"title": "x", "rating": 9})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &app,
        json_request(Method::POST, "/v1/movies", json!({"year": "2010"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_twice() {
    let app = unlimited_app();
    send(&app, json_request(Method::POST, "/v1/movies", inception())).await;

    let (status, _, body) = send(&app, empty_request(Method::DELETE, "/v1/movies/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "movie successfully deleted");

    let (status, _, body) = send(&app, empty_request(Method::DELETE, "/v1/movies/1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_non_numeric_ids_are_not_found() {
    let app = unlimited_app();
    for uri in ["/v1/movies/abc", "/v1/movies/0", "/v1/movies/-4"] {
        let (status, _, _) = send(&app, empty_request(Method::GET, uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_list_filters_sort_and_metadata() {
    let app = unlimited_app();
    for movie in [
        json!({"title": "Inception", "year": 2010, "runtime": 148, "genres": ["scifi", "thriller"]}),
        json!({"title": "Interstellar", "year": 2014, "runtime": 169, "genres": ["scifi", "drama"]}),
        json!({"title": "Tenet", "year": 2020, "runtime": 150, "genres": ["scifi", "action"]}),
        json!({"title": "The Prestige", "year": 2006, "runtime": 130, "genres": ["drama"]}),
    ] {
        let (status, _, _) = send(&app, json_request(Method::POST, "/v1/movies", movie)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _, body) = send(
        &app,
        empty_request(Method::GET, "/v1/movies?genres=scifi&sort=-year&page_size=2&page=1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<_> = body["movies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Tenet", "Interstellar"]);
    assert_eq!(
        body["metadata"],
        json!({"current_page": 1, "page_size": 2, "last_page": 2, "total_records": 3})
    );

    let (_, _, body) = send(&app, empty_request(Method::GET, "/v1/movies?title=prestige")).await;
    assert_eq!(body["movies"].as_array().unwrap().len(), 1);
    assert_eq!(body["metadata"]["total_records"], 1);

    let (_, _, body) = send(&app, empty_request(Method::GET, "/v1/movies?genres=western")).await;
    assert_eq!(body["movies"], json!([]));
    assert_eq!(
        body["metadata"],
        json!({"current_page": 0, "page_size": 0, "last_page": 0, "total_records": 0})
    );
}

#[tokio::test]
async fn test_list_rejects_bad_query_parameters() {
    let app = unlimited_app();

    let (status, _, body) = send(
        &app,
        empty_request(Method::GET, "/v1/movies?sort=created_at&page=abc&page_size=500"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fields"]["sort"], "invalid sort value");
    assert_eq!(body["fields"]["page"], "must be an integer");
    assert_eq!(body["fields"]["page_size"], "must be a maximum of 100");
}

#[tokio::test]
async fn test_rate_limit_exceeded() {
    let app = app(LimiterConfig {
        rps: 2.0,
        burst: 4,
        ..LimiterConfig::default()
    });

    for _ in 0..4 {
        let (status, _, _) = send(&app, empty_request(Method::GET, "/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, headers, body) = send(&app, empty_request(Method::GET, "/v1/health")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limit_exceeded");
    assert!(headers.contains_key(header::RETRY_AFTER));

    tokio::time::sleep(std::time::Duration::from_millis(600)).await;
    let (status, _, _) = send(&app, empty_request(Method::GET, "/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, empty_request(Method::GET, "/v1/health")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rate_limit_at_tiny_rate_is_not_a_server_error() {
    let app = app(LimiterConfig {
        rps: 1e-20,
        burst: 1,
        ..LimiterConfig::default()
    });

    let (status, _, _) = send(&app, empty_request(Method::GET, "/v1/health")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&app, empty_request(Method::GET, "/v1/health")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limit_exceeded");
}

#[tokio::test]
async fn test_missing_client_address_is_a_server_error() {
    let state = Arc::new(AppState {
        environment: Environment::Development,
        movies: Arc::new(InMemoryMovieRepository::new()),
        rate_limiter: RateLimiter::new(LimiterConfig::default()),
    });
    let app = create_app(state);

    let (status, _, body) = send(&app, empty_request(Method::GET, "/v1/health")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal_error");
    assert!(!body["message"].as_str().unwrap().contains("connection info"));
}

#[tokio::test]
async fn test_unknown_route_and_method() {
    let app = unlimited_app();

    let (status, _, body) = send(&app, empty_request(Method::GET, "/v1/directors")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, headers, body) = send(&app, empty_request(Method::PUT, "/v1/movies/1")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "method_not_allowed");
    assert!(headers.contains_key(header::ALLOW));
}
