// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health, GET /routes
// - account setup (create_user / create_client / associate_user_to_client)
// - POST /add_energy_data (success, discards, bad shape, auth)
// - GET /get_client_data, GET /get_category_sum
// - malformed JSON bodies and store failures keep the {"error"} envelope

use std::sync::Arc;

use async_trait::async_trait;
use http::{Request, StatusCode};
use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use footprint_aggregator::airports::{AirportTable, ChainedResolver};
use footprint_aggregator::api::{self, AppState, API_KEY_HEADER};
use footprint_aggregator::directory::InMemoryDirectory;
use footprint_aggregator::error::StoreError;
use footprint_aggregator::snapshot::AggregateSnapshot;
use footprint_aggregator::store::SnapshotStore;

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

fn test_router(state: &AppState) -> Router {
    api::router(state.clone())
}

async fn send(
    state: &AppState,
    method: &str,
    uri: &str,
    key: Option<&str>,
    body: Option<Json>,
) -> (StatusCode, Json) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(k) = key {
        req = req.header(API_KEY_HEADER, k);
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string())),
        None => req.body(Body::empty()),
    }
    .expect("build request");

    let resp = test_router(state).oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

/// Creates a user, a client and the association; returns the user's API key.
async fn setup_account(state: &AppState, username: &str, client: &str) -> String {
    let (s, v) = send(
        state,
        "POST",
        "/create_user",
        None,
        Some(json!({ "username": username, "email": format!("{username}@example.com") })),
    )
    .await;
    assert_eq!(s, StatusCode::CREATED, "{v}");
    let key = v["user"]["api_key"].as_str().expect("api_key").to_string();

    let (s, _) = send(state, "POST", "/create_client", None, Some(json!({ "name": client }))).await;
    assert!(s == StatusCode::CREATED || s == StatusCode::CONFLICT);

    let (s, v) = send(
        state,
        "POST",
        "/associate_user_to_client",
        None,
        Some(json!({ "client_name": client, "username": username })),
    )
    .await;
    assert_eq!(s, StatusCode::OK, "{v}");
    key
}

/// Sends `raw` verbatim as a JSON body.
async fn send_raw(state: &AppState, uri: &str, key: Option<&str>, raw: &str) -> (StatusCode, Json) {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(k) = key {
        req = req.header(API_KEY_HEADER, k);
    }
    let req = req.body(Body::from(raw.to_string())).expect("build request");
    let resp = test_router(state).oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, serde_json::from_slice(&bytes).unwrap_or(Json::Null))
}

/// Store that refuses every write and has nothing to read.
struct DownStore;

#[async_trait]
impl SnapshotStore for DownStore {
    async fn append(&self, _snapshot: &AggregateSnapshot) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk detached".into()))
    }

    async fn latest_for(
        &self,
        _client_name: &str,
        _actor_key: &str,
    ) -> Result<Option<AggregateSnapshot>, StoreError> {
        Ok(None)
    }

    async fn latest_for_actor(&self, _actor_key: &str) -> Result<Option<AggregateSnapshot>, StoreError> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "down"
    }
}

fn electricity(name: &str, start: &str, end: &str, value: f64) -> Json {
    json!({
        "document_name": name,
        "period": { "start_date": start, "end_date": end },
        "total_electricity_consumption": { "value": value, "unit": "kWh" }
    })
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let state = AppState::in_memory();
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = test_router(&state).oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let body = String::from_utf8(bytes).expect("utf8");
    assert_eq!(body.trim(), "OK", "health body should be 'OK'");
}

#[tokio::test]
async fn api_routes_lists_every_endpoint() {
    let state = AppState::in_memory();
    let (s, v) = send(&state, "GET", "/routes", None, None).await;
    assert_eq!(s, StatusCode::OK);
    let routes = v["routes"].as_array().expect("routes array");
    assert_eq!(routes.len(), api::ROUTES.len());
    assert!(routes.iter().any(|r| r == "/add_energy_data POST"));
}

#[tokio::test]
async fn account_conflicts_map_to_409_and_404() {
    let state = AppState::in_memory();
    setup_account(&state, "alice", "Acme").await;

    let (s, _) = send(
        &state,
        "POST",
        "/create_user",
        None,
        Some(json!({ "username": "alice2", "email": "alice@example.com" })),
    )
    .await;
    assert_eq!(s, StatusCode::CONFLICT);

    let (s, _) = send(
        &state,
        "POST",
        "/associate_user_to_client",
        None,
        Some(json!({ "client_name": "Nope", "username": "alice" })),
    )
    .await;
    assert_eq!(s, StatusCode::NOT_FOUND);

    let (s, v) = send(&state, "POST", "/create_user", None, Some(json!({ "username": "x" }))).await;
    assert_eq!(s, StatusCode::BAD_REQUEST);
    assert!(v["error"].as_str().unwrap().contains("email"));
}

#[tokio::test]
async fn add_energy_data_requires_a_known_key() {
    let state = AppState::in_memory();
    let body = json!({ "year": 2023, "items": [] });

    let (s, _) = send(&state, "POST", "/add_energy_data", None, Some(body.clone())).await;
    assert_eq!(s, StatusCode::UNAUTHORIZED);

    let (s, _) = send(&state, "POST", "/add_energy_data", Some("bogus"), Some(body)).await;
    assert_eq!(s, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unassociated_user_is_forbidden() {
    let state = AppState::in_memory();
    let (_, v) = send(
        &state,
        "POST",
        "/create_user",
        None,
        Some(json!({ "username": "loner", "email": "loner@example.com" })),
    )
    .await;
    let key = v["user"]["api_key"].as_str().unwrap().to_string();

    let (s, _) = send(
        &state,
        "POST",
        "/add_energy_data",
        Some(&key),
        Some(json!({ "year": 2023, "items": [] })),
    )
    .await;
    assert_eq!(s, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn electricity_scenario_accepts_in_year_and_reports_the_rest() {
    let state = AppState::in_memory();
    let key = setup_account(&state, "alice", "Acme").await;

    let (s, v) = send(
        &state,
        "POST",
        "/add_energy_data",
        Some(&key),
        Some(json!({
            "year": 2023,
            "items": [
                electricity("jan.pdf", "2023-01-01", "2023-01-31", 100.0),
                electricity("old.pdf", "2022-01-01", "2022-01-31", 50.0)
            ]
        })),
    )
    .await;
    assert_eq!(s, StatusCode::CREATED, "{v}");
    assert_eq!(v["client"], "Acme");
    assert_eq!(v["totals"]["Electricity"]["total"], 100.0);
    assert_eq!(v["totals"]["Electricity"]["unit"], "kWh");
    assert_eq!(v["discarded"].as_array().unwrap().len(), 1);
    assert_eq!(v["discarded"][0]["document_name"], "old.pdf");
    assert_eq!(v["discarded"][0]["reason"], "out-of-year");
    assert!(v["note"].as_str().unwrap().contains("old.pdf"));

    let (s, v) = send(&state, "GET", "/get_client_data?name=Acme", Some(&key), None).await;
    assert_eq!(s, StatusCode::OK, "{v}");
    assert_eq!(v["year"], 2023);
    assert_eq!(v["username"], "alice");
    assert_eq!(v["data"]["Electricity"].as_array().unwrap().len(), 1);
    assert!(v["data"]["Flight"].as_array().unwrap().is_empty());
    assert_eq!(v["users"][0]["email"], "alice@example.com");
}

#[tokio::test]
async fn clean_submission_has_no_note() {
    let state = AppState::in_memory();
    let key = setup_account(&state, "alice", "Acme").await;

    let (s, v) = send(
        &state,
        "POST",
        "/add_energy_data",
        Some(&key),
        Some(json!({
            "year": "2023",
            "items": [{
                "document_name": "trip",
                "date": "2023-03-10",
                "travel": { "from_airport_code": "FCO", "to_airport_code": "JFK" },
                "num_travelers": 2
            }]
        })),
    )
    .await;
    assert_eq!(s, StatusCode::CREATED, "{v}");
    assert!(v["note"].is_null());
    assert!(v["discarded"].as_array().unwrap().is_empty());
    let impact = v["totals"]["Flight"]["total"].as_f64().unwrap();
    assert!((impact - 13_814.0).abs() / 13_814.0 < 0.01, "impact {impact}");
}

#[tokio::test]
async fn malformed_submission_is_rejected_and_nothing_is_stored() {
    let state = AppState::in_memory();
    let key = setup_account(&state, "alice", "Acme").await;

    let (s, v) = send(
        &state,
        "POST",
        "/add_energy_data",
        Some(&key),
        Some(json!({ "items": [] })),
    )
    .await;
    assert_eq!(s, StatusCode::BAD_REQUEST);
    assert!(v["error"].as_str().unwrap().contains("year"));

    let (s, _) = send(
        &state,
        "POST",
        "/add_energy_data",
        Some(&key),
        Some(json!({ "year": 2023, "items": "nope" })),
    )
    .await;
    assert_eq!(s, StatusCode::BAD_REQUEST);

    let (s, _) = send(&state, "GET", "/get_client_data?name=Acme", Some(&key), None).await;
    assert_eq!(s, StatusCode::NOT_FOUND, "no snapshot should exist");
}

#[tokio::test]
async fn latest_snapshot_wins() {
    let state = AppState::in_memory();
    let key = setup_account(&state, "alice", "Acme").await;

    for value in [10.0, 20.0] {
        let (s, _) = send(
            &state,
            "POST",
            "/add_energy_data",
            Some(&key),
            Some(json!({
                "year": 2023,
                "items": [electricity("e", "2023-01-01", "2023-01-31", value)]
            })),
        )
        .await;
        assert_eq!(s, StatusCode::CREATED);
    }

    let (_, v) = send(&state, "GET", "/get_client_data?name=Acme", Some(&key), None).await;
    assert_eq!(v["data"]["Electricity"][0]["consumption"]["value"], 20.0);
}

#[tokio::test]
async fn client_data_is_scoped_to_authorized_users() {
    let state = AppState::in_memory();
    let alice = setup_account(&state, "alice", "Acme").await;
    let bob = setup_account(&state, "bob", "Globex").await;

    let (s, _) = send(
        &state,
        "POST",
        "/add_energy_data",
        Some(&alice),
        Some(json!({
            "year": 2023,
            "items": [electricity("e", "2023-01-01", "2023-01-31", 1.0)]
        })),
    )
    .await;
    assert_eq!(s, StatusCode::CREATED);

    let (s, _) = send(&state, "GET", "/get_client_data?name=Acme", Some(&bob), None).await;
    assert_eq!(s, StatusCode::FORBIDDEN);

    let (s, _) = send(&state, "GET", "/get_client_data?name=Initech", Some(&bob), None).await;
    assert_eq!(s, StatusCode::NOT_FOUND);

    let (s, _) = send(&state, "GET", "/get_client_data", Some(&bob), None).await;
    assert_eq!(s, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn category_sum_over_year_range() {
    let state = AppState::in_memory();
    let key = setup_account(&state, "alice", "Acme").await;

    let (s, _) = send(
        &state,
        "POST",
        "/add_energy_data",
        Some(&key),
        Some(json!({
            "year": 2023,
            "items": [
                electricity("a", "2023-01-01", "2023-01-31", 100.0),
                electricity("b", "2022-12-15", "2023-01-15", 25.0)
            ]
        })),
    )
    .await;
    assert_eq!(s, StatusCode::CREATED);

    let (s, v) = send(
        &state,
        "GET",
        "/get_category_sum?category=electricity&start_year=2023&end_year=2023",
        Some(&key),
        None,
    )
    .await;
    assert_eq!(s, StatusCode::OK, "{v}");
    assert_eq!(v["sum"], 125.0);
    assert_eq!(v["unit"], "kWh");

    let (s, _) = send(
        &state,
        "GET",
        "/get_category_sum?category=gas&start_year=2023&end_year=2023",
        Some(&key),
        None,
    )
    .await;
    assert_eq!(s, StatusCode::NOT_FOUND);

    let (s, _) = send(
        &state,
        "GET",
        "/get_category_sum?category=electricity&start_year=2024&end_year=2023",
        Some(&key),
        None,
    )
    .await;
    assert_eq!(s, StatusCode::BAD_REQUEST);

    let (s, _) = send(
        &state,
        "GET",
        "/get_category_sum?category=coal&start_year=2023&end_year=2023",
        Some(&key),
        None,
    )
    .await;
    assert_eq!(s, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn category_sum_reads_the_newest_snapshot_across_clients() {
    let state = AppState::in_memory();
    let bob = setup_account(&state, "bob", "Acme").await;
    let alice = setup_account(&state, "alice", "Globex").await;
    let (s, _) = send(
        &state,
        "POST",
        "/associate_user_to_client",
        None,
        Some(json!({ "client_name": "Globex", "username": "bob" })),
    )
    .await;
    assert_eq!(s, StatusCode::OK);

    for (key, value) in [(&bob, 10.0), (&alice, 99.0)] {
        let (s, _) = send(
            &state,
            "POST",
            "/add_energy_data",
            Some(key),
            Some(json!({
                "year": 2023,
                "items": [electricity("e", "2023-01-01", "2023-01-31", value)]
            })),
        )
        .await;
        assert_eq!(s, StatusCode::CREATED);
    }

    let (s, v) = send(
        &state,
        "GET",
        "/get_category_sum?category=electricity&start_year=2023&end_year=2023",
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(s, StatusCode::OK, "{v}");
    assert_eq!(v["sum"], 99.0);
    assert_eq!(v["client"], "Globex");
}

#[tokio::test]
async fn stored_items_keep_every_submitted_field() {
    let state = AppState::in_memory();
    let key = setup_account(&state, "alice", "Acme").await;
    let consumption = json!({ "value": 100, "unit": "kWh", "meter_id": "M-9", "f1": 40 });
    let period = json!({ "start_date": "2023-01-01", "end_date": "2023-01-31", "billing_ref": "P1" });

    let (s, _) = send(
        &state,
        "POST",
        "/add_energy_data",
        Some(&key),
        Some(json!({
            "year": 2023,
            "items": [{
                "document_name": "jan.pdf",
                "period": period,
                "total_electricity_consumption": consumption
            }]
        })),
    )
    .await;
    assert_eq!(s, StatusCode::CREATED);

    let (_, v) = send(&state, "GET", "/get_client_data?name=Acme", Some(&key), None).await;
    let item = &v["data"]["Electricity"][0];
    assert_eq!(item["consumption"], consumption);
    assert_eq!(item["period"], period);
}

#[tokio::test]
async fn malformed_json_body_uses_the_error_envelope() {
    let state = AppState::in_memory();
    let key = setup_account(&state, "alice", "Acme").await;

    let (s, v) = send_raw(&state, "/add_energy_data", Some(&key), r#"{"year":"#).await;
    assert_eq!(s, StatusCode::BAD_REQUEST);
    assert!(v["error"].is_string(), "{v}");

    let (s, v) = send_raw(&state, "/create_user", None, "not json").await;
    assert_eq!(s, StatusCode::BAD_REQUEST);
    assert!(v["error"].is_string(), "{v}");

    let (s, v) = send_raw(&state, "/create_client", None, r#"{"name": 7}"#).await;
    assert_eq!(s, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(v["error"].is_string(), "{v}");
}

#[tokio::test]
async fn store_failure_is_a_500_and_nothing_is_readable() {
    let state = AppState::new(
        Arc::new(InMemoryDirectory::new()),
        Arc::new(DownStore),
        Arc::new(ChainedResolver::table_only(AirportTable::default_seed())),
    );
    let key = setup_account(&state, "alice", "Acme").await;

    let (s, v) = send(
        &state,
        "POST",
        "/add_energy_data",
        Some(&key),
        Some(json!({
            "year": 2023,
            "items": [electricity("e", "2023-01-01", "2023-01-31", 1.0)]
        })),
    )
    .await;
    assert_eq!(s, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(v, json!({ "error": "snapshot store unavailable" }));

    let (s, _) = send(&state, "GET", "/get_client_data?name=Acme", Some(&key), None).await;
    assert_eq!(s, StatusCode::NOT_FOUND);
}
