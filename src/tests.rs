use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use cookie::Cookie;
use serde_json::{json, Value};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
    app::build_app,
    model::{RideStatus, Role},
    state::AppState,
    store::{MemoryStore, Store},
};

const SESSION: &str = "rideshare_session";

fn server_with(store: Arc<MemoryStore>) -> TestServer {
    let state = AppState::with_store(store);
    TestServer::new(build_app(state)).unwrap()
}

fn server() -> TestServer {
    TestServer::new(build_app(AppState::fake())).unwrap()
}

fn registration(email: &str, role: &str) -> Value {
    json!({
        "firstName": "Test",
        "lastName": "User",
        "email": email,
        "phone": "9800000000",
        "password": "pa55word",
        "role": role,
    })
}

/// Registers a user and returns the session cookie and user id.
async fn register(server: &TestServer, email: &str, role: &str) -> (Cookie<'static>, String) {
    let response = server
        .post("/api/auth/register")
        .json(&registration(email, role))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    (response.cookie(SESSION), body["id"].as_str().unwrap().to_string())
}

async fn create_ride(server: &TestServer, driver: &Cookie<'static>, origin: &str, seats: i32) -> String {
    let response = server
        .post("/api/rides")
        .add_cookie(driver.clone())
        .json(&json!({
            "origin": origin,
            "destination": "Andheri West",
            "date": "2026-11-01",
            "time": "08:15",
            "availableSeats": seats,
            "price": 150,
            "vehicleType": "Hatchback",
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["id"].as_str().unwrap().to_string()
}

async fn request_seats(
    server: &TestServer,
    rider: &Cookie<'static>,
    ride_id: &str,
    seats: i32,
) -> String {
    let response = server
        .post("/api/requests")
        .add_cookie(rider.clone())
        .json(&json!({ "rideId": ride_id, "seats": seats, "message": "near the gate" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["id"].as_str().unwrap().to_string()
}

async fn ride_seats(server: &TestServer, driver: &Cookie<'static>, ride_id: &str) -> i64 {
    let rides: Value = server
        .get("/api/rides/my")
        .add_cookie(driver.clone())
        .await
        .json();
    rides
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["id"] == ride_id)
        .map(|r| r["availableSeats"].as_i64().unwrap())
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let server = server();
    let response = server.get("/api/health").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn unknown_api_route_is_json_not_found() {
    let server = server();
    let response = server.get("/api/nowhere").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["message"], "Not found");
}

#[tokio::test]
async fn register_sets_session_and_hides_password() {
    let server = server();
    let response = server
        .post("/api/auth/register")
        .json(&registration("  Asha@Example.com ", "driver"))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    assert_eq!(body["email"], "asha@example.com");
    assert_eq!(body["role"], "driver");
    assert_eq!(body["rating"], 5);
    assert_eq!(body["totalRides"], 0);
    assert!(body.get("password").is_none());
    assert!(body.get("passwordHash").is_none());

    let me: Value = server
        .get("/api/auth/me")
        .add_cookie(response.cookie(SESSION))
        .await
        .json();
    assert_eq!(me["id"], body["id"]);
}

#[tokio::test]
async fn duplicate_email_is_rejected_without_new_row() {
    let store = Arc::new(MemoryStore::new());
    let server = server_with(store.clone());
    register(&server, "dup@example.com", "rider").await;

    let response = server
        .post("/api/auth/register")
        .json(&registration("dup@example.com", "driver"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Email already registered");
    assert_eq!(store.counts().await.0, 1);
}

#[tokio::test]
async fn register_names_first_missing_field() {
    let server = server();
    let response = server
        .post("/api/auth/register")
        .json(&json!({ "firstName": "A", "email": "a@example.com" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Missing field: lastName");
}

#[tokio::test]
async fn register_rejects_unknown_role_and_bad_email() {
    let server = server();
    let response = server
        .post("/api/auth/register")
        .json(&registration("x@example.com", "admin"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/auth/register")
        .json(&registration("not-an-email", "rider"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Invalid email");
}

#[tokio::test]
async fn login_checks_password() {
    let server = server();
    register(&server, "login@example.com", "rider").await;

    let response = server
        .post("/api/auth/login")
        .json(&json!({ "email": "login@example.com", "password": "wrong" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["message"], "Invalid credentials");

    let response = server
        .post("/api/auth/login")
        .json(&json!({ "email": "nobody@example.com", "password": "pa55word" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .post("/api/auth/login")
        .json(&json!({ "email": "LOGIN@example.com", "password": "pa55word" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["email"], "login@example.com");
    assert!(body.get("password").is_none());
    assert!(!response.cookie(SESSION).value().is_empty());
}

#[tokio::test]
async fn login_requires_both_fields() {
    let server = server();
    let response = server
        .post("/api/auth/login")
        .json(&json!({ "email": "a@example.com" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["message"],
        "Email and password required"
    );
}

#[tokio::test]
async fn protected_routes_require_session() {
    let server = server();
    for path in ["/api/auth/me", "/api/rides/my", "/api/requests/my"] {
        let response = server.get(path).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["message"], "Unauthorized");
    }

    let response = server
        .get("/api/auth/me")
        .add_cookie(Cookie::new(SESSION, "not-a-session"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_ends_session_and_is_idempotent() {
    let server = server();
    let (cookie, _) = register(&server, "bye@example.com", "rider").await;

    let response = server
        .post("/api/auth/logout")
        .add_cookie(cookie.clone())
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["message"], "Logged out successfully");

    server
        .get("/api/auth/me")
        .add_cookie(cookie.clone())
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .post("/api/auth/logout")
        .add_cookie(cookie)
        .await
        .assert_status_ok();
    server.post("/api/auth/logout").await.assert_status_ok();
}

#[tokio::test]
async fn logout_removes_an_expired_session_row() {
    let store = Arc::new(MemoryStore::new());
    let server = server_with(store.clone());
    let (_, user_id) = register(&server, "stale@example.com", "rider").await;
    let user_id: Uuid = user_id.parse().unwrap();

    let past = OffsetDateTime::now_utc() - Duration::minutes(1);
    let stale = store.create_session(user_id, Role::Rider, past).await.unwrap();
    assert_eq!(store.session_count().await, 2);

    server
        .post("/api/auth/logout")
        .add_cookie(Cookie::new(SESSION, stale.id.to_string()))
        .await
        .assert_status_ok();
    assert_eq!(store.session_count().await, 1);
}

#[tokio::test]
async fn login_sweeps_expired_sessions() {
    let store = Arc::new(MemoryStore::new());
    let server = server_with(store.clone());
    let (_, user_id) = register(&server, "sweep@example.com", "driver").await;
    let user_id: Uuid = user_id.parse().unwrap();

    let past = OffsetDateTime::now_utc() - Duration::minutes(1);
    for _ in 0..5 {
        store.create_session(user_id, Role::Driver, past).await.unwrap();
    }
    assert_eq!(store.session_count().await, 6);

    server
        .post("/api/auth/login")
        .json(&json!({ "email": "sweep@example.com", "password": "pa55word" }))
        .await
        .assert_status_ok();
    // the registration session plus the new one
    assert_eq!(store.session_count().await, 2);
}

#[tokio::test]
async fn me_for_removed_user_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let server = server_with(store.clone());
    let (cookie, user_id) = register(&server, "gone@example.com", "rider").await;
    store.remove_user(user_id.parse().unwrap()).await;

    let response = server.get("/api/auth/me").add_cookie(cookie).await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["message"], "User not found");
}

#[tokio::test]
async fn rider_cannot_list_driver_rides() {
    let server = server();
    let (rider, _) = register(&server, "r@example.com", "rider").await;
    let response = server.get("/api/rides/my").add_cookie(rider).await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(
        response.json::<Value>()["message"],
        "Only drivers can perform this action"
    );
}

#[tokio::test]
async fn omitted_notes_and_message_are_empty_strings() {
    let server = server();
    let (driver, _) = register(&server, "d@example.com", "driver").await;
    let (rider, _) = register(&server, "r@example.com", "rider").await;
    let ride_id = create_ride(&server, &driver, "Dadar", 2).await;

    let rides: Value = server.get("/api/rides/my").add_cookie(driver).await.json();
    assert_eq!(rides[0]["notes"], "");

    let response = server
        .post("/api/requests")
        .add_cookie(rider)
        .json(&json!({ "rideId": ride_id, "seats": 1 }))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<Value>()["message"], "");
}

fn origin(value: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("origin"),
        HeaderValue::from_static(value),
    )
}

#[tokio::test]
async fn default_cors_does_not_allow_credentials() {
    let server = server();
    let (name, value) = origin("https://elsewhere.example");
    let response = server.get("/api/health").add_header(name, value).await;
    response.assert_status_ok();
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert!(headers.get("access-control-allow-credentials").is_none());
}

#[tokio::test]
async fn configured_origins_get_credentials_others_do_not() {
    let mut state = AppState::fake();
    Arc::make_mut(&mut state.config).cors_origins = vec!["http://localhost:5173".into()];
    let server = TestServer::new(build_app(state)).unwrap();

    let (name, value) = origin("http://localhost:5173");
    let response = server.get("/api/health").add_header(name, value).await;
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "http://localhost:5173");
    assert_eq!(headers["access-control-allow-credentials"], "true");

    let (name, value) = origin("https://evil.example");
    let response = server.get("/api/health").add_header(name, value).await;
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn rider_cannot_create_ride() {
    let store = Arc::new(MemoryStore::new());
    let server = server_with(store.clone());
    let (rider, _) = register(&server, "rider@example.com", "rider").await;

    let response = server
        .post("/api/rides")
        .add_cookie(rider)
        .json(&json!({
            "origin": "Dadar",
            "destination": "Thane",
            "date": "2026-11-02",
            "time": "10:00",
            "availableSeats": 2,
            "price": 100,
            "vehicleType": "Sedan",
        }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(
        response.json::<Value>()["message"],
        "Only drivers can perform this action"
    );
    assert_eq!(store.counts().await.1, 0);
}

#[tokio::test]
async fn create_ride_names_missing_field() {
    let server = server();
    let (driver, _) = register(&server, "d@example.com", "driver").await;
    let response = server
        .post("/api/rides")
        .add_cookie(driver)
        .json(&json!({ "origin": "Dadar", "destination": "Thane", "date": "2026-11-02" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Missing field: time");
}

#[tokio::test]
async fn driver_cannot_request_seats() {
    let server = server();
    let (driver, _) = register(&server, "d@example.com", "driver").await;
    let ride_id = create_ride(&server, &driver, "Dadar", 3).await;

    let response = server
        .post("/api/requests")
        .add_cookie(driver)
        .json(&json!({ "rideId": ride_id, "seats": 1 }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(
        response.json::<Value>()["message"],
        "Only riders can perform this action"
    );
}

#[tokio::test]
async fn request_for_too_many_seats_is_rejected_without_row() {
    let store = Arc::new(MemoryStore::new());
    let server = server_with(store.clone());
    let (driver, _) = register(&server, "d@example.com", "driver").await;
    let (rider, _) = register(&server, "r@example.com", "rider").await;
    let ride_id = create_ride(&server, &driver, "Dadar", 2).await;

    let response = server
        .post("/api/requests")
        .add_cookie(rider.clone())
        .json(&json!({ "rideId": ride_id, "seats": 3 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["message"],
        "Not enough available seats"
    );
    assert_eq!(store.counts().await.2, 0);

    let response = server
        .post("/api/requests")
        .add_cookie(rider)
        .json(&json!({ "rideId": Uuid::new_v4(), "seats": 1 }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["message"], "Ride not found");
}

#[tokio::test]
async fn search_matches_substrings_and_skips_cancelled() {
    let store = Arc::new(MemoryStore::new());
    let server = server_with(store.clone());
    let (driver, _) = register(&server, "d@example.com", "driver").await;
    let open = create_ride(&server, &driver, "Mumbai Central", 3).await;
    let cancelled = create_ride(&server, &driver, "Mumbai Central Depot", 3).await;
    create_ride(&server, &driver, "Pune", 3).await;
    store
        .set_ride_status(cancelled.parse().unwrap(), RideStatus::Cancelled)
        .await;

    let response = server
        .get("/api/rides/search")
        .add_query_param("origin", "mumbai central")
        .add_query_param("date", "")
        .await;
    response.assert_status_ok();
    let rides: Value = response.json();
    let rides = rides.as_array().unwrap();
    assert_eq!(rides.len(), 1);
    assert_eq!(rides[0]["id"], open.as_str());
    assert_eq!(rides[0]["driver"]["email"], "d@example.com");
    assert!(rides[0]["driver"].get("password").is_none());
}

#[tokio::test]
async fn full_booking_flow() {
    let server = server();
    let (driver, driver_id) = register(&server, "driver@example.com", "driver").await;
    let ride_id = create_ride(&server, &driver, "Mumbai Central", 3).await;

    let (rider, rider_id) = register(&server, "rider@example.com", "rider").await;
    let request_id = request_seats(&server, &rider, &ride_id, 2).await;

    // the driver comes back later on a fresh session
    let response = server
        .post("/api/auth/login")
        .json(&json!({ "email": "driver@example.com", "password": "pa55word" }))
        .await;
    response.assert_status_ok();
    let driver = response.cookie(SESSION);

    let incoming: Value = server
        .get("/api/requests/my")
        .add_cookie(driver.clone())
        .await
        .json();
    let incoming = incoming.as_array().unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0]["status"], "pending");
    assert_eq!(incoming[0]["rider"]["id"], rider_id.as_str());
    assert_eq!(incoming[0]["ride"]["origin"], "Mumbai Central");

    let response = server
        .patch(&format!("/api/requests/{request_id}"))
        .add_cookie(driver.clone())
        .json(&json!({ "status": "accepted" }))
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>()["message"],
        "Request updated successfully"
    );
    assert_eq!(ride_seats(&server, &driver, &ride_id).await, 1);

    let mine: Value = server
        .get("/api/requests/my")
        .add_cookie(rider)
        .await
        .json();
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["status"], "accepted");
    assert_eq!(mine[0]["message"], "near the gate");
    assert_eq!(mine[0]["ride"]["driver"]["id"], driver_id.as_str());
    assert!(mine[0].get("rider").is_none());

    // a second resolution must not take seats again
    let response = server
        .patch(&format!("/api/requests/{request_id}"))
        .add_cookie(driver.clone())
        .json(&json!({ "status": "accepted" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["message"],
        "Request has already been accepted"
    );
    assert_eq!(ride_seats(&server, &driver, &ride_id).await, 1);
}

#[tokio::test]
async fn overlapping_accepts_cannot_overdraw_seats() {
    let server = server();
    let (driver, _) = register(&server, "d@example.com", "driver").await;
    let (rider_a, _) = register(&server, "a@example.com", "rider").await;
    let (rider_b, _) = register(&server, "b@example.com", "rider").await;
    let ride_id = create_ride(&server, &driver, "Dadar", 3).await;
    let first = request_seats(&server, &rider_a, &ride_id, 2).await;
    let second = request_seats(&server, &rider_b, &ride_id, 2).await;

    server
        .patch(&format!("/api/requests/{first}"))
        .add_cookie(driver.clone())
        .json(&json!({ "status": "accepted" }))
        .await
        .assert_status_ok();

    let response = server
        .patch(&format!("/api/requests/{second}"))
        .add_cookie(driver.clone())
        .json(&json!({ "status": "accepted" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["message"],
        "Not enough available seats"
    );
    assert_eq!(ride_seats(&server, &driver, &ride_id).await, 1);

    // declining the leftover still works
    server
        .patch(&format!("/api/requests/{second}"))
        .add_cookie(driver.clone())
        .json(&json!({ "status": "declined" }))
        .await
        .assert_status_ok();
    assert_eq!(ride_seats(&server, &driver, &ride_id).await, 1);
}

#[tokio::test]
async fn status_update_guards() {
    let server = server();
    let (owner, _) = register(&server, "owner@example.com", "driver").await;
    let (other, _) = register(&server, "other@example.com", "driver").await;
    let (rider, _) = register(&server, "r@example.com", "rider").await;
    let ride_id = create_ride(&server, &owner, "Dadar", 3).await;
    let request_id = request_seats(&server, &rider, &ride_id, 1).await;
    let path = format!("/api/requests/{request_id}");

    let response = server
        .patch(&path)
        .add_cookie(owner.clone())
        .json(&json!({ "status": "pending" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "Invalid status");

    let response = server
        .patch(&path)
        .add_cookie(other)
        .json(&json!({ "status": "accepted" }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(
        response.json::<Value>()["message"],
        "You can only manage requests for your own rides"
    );

    server
        .patch(&path)
        .add_cookie(rider)
        .json(&json!({ "status": "accepted" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let response = server
        .patch(&format!("/api/requests/{}", Uuid::new_v4()))
        .add_cookie(owner.clone())
        .json(&json!({ "status": "accepted" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["message"], "Request not found");

    server
        .patch("/api/requests/not-a-uuid")
        .add_cookie(owner.clone())
        .json(&json!({ "status": "accepted" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    assert_eq!(ride_seats(&server, &owner, &ride_id).await, 3);
}
