use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use seatledger_api::{app, AppState};
use seatledger_core::repository::{
    BookingChange, BookingGuard, BookingStore, StoreError, StoreResult, WriteOutcome,
};
use seatledger_core::{InventoryLedger, MemoryStore};
use seatledger_shared::{Booking, Flight, FlightKey};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
}

fn test_app() -> Router {
    let store = Arc::new(MemoryStore::with_flights([
        Flight::new("SL101", day(14), 5)
            .with_capacity(5)
            .with_route("Lisbon", "Oslo"),
        Flight::new("SL101", day(15), 10)
            .with_capacity(10)
            .with_route("Lisbon", "Oslo"),
    ]));
    app(AppState::new(InventoryLedger::new(store.clone(), store)))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn book(app: &Router, seats: u32) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/v1/bookings",
        Some(json!({
            "userId": "user-1",
            "flightId": "SL101",
            "seats": seats,
            "departureDate": "2025-03-14"
        })),
    )
    .await
}

async fn availability(app: &Router, date: &str) -> i64 {
    let (status, body) = send(app, "GET", &format!("/v1/admin/flights/SL101/{}/audit", date), None).await;
    assert_eq!(status, StatusCode::OK);
    body["seatAvailability"].as_i64().unwrap()
}

#[tokio::test]
async fn test_book_and_overbook() {
    let app = test_app();

    let (status, body) = book(&app, 3).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Booking created successfully");
    assert!(Uuid::parse_str(body["bookingId"].as_str().unwrap()).is_ok());
    assert_eq!(availability(&app, "2025-03-14").await, 2);

    let (status, body) = book(&app, 3).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Not enough seats available");
    assert_eq!(availability(&app, "2025-03-14").await, 2);
}

#[tokio::test]
async fn test_cancel_twice() {
    let app = test_app();
    let (_, body) = book(&app, 3).await;
    let booking_id = body["bookingId"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "POST", "/v1/bookings/cancel", Some(json!({ "bookingId": booking_id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Booking canceled successfully");
    assert_eq!(body["updatedAttributes"]["status"], "canceled");
    assert_eq!(availability(&app, "2025-03-14").await, 5);

    let (status, body) = send(&app, "POST", "/v1/bookings/cancel", Some(json!({ "bookingId": booking_id }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already been canceled"));
    assert_eq!(availability(&app, "2025-03-14").await, 5);

    let (status, body) = send(&app, "GET", &format!("/v1/bookings/{}", booking_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "canceled");
    assert_eq!(body["seats"], 3);
}

#[tokio::test]
async fn test_update_flow() {
    let app = test_app();
    let (_, body) = book(&app, 3).await;
    let booking_id = body["bookingId"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "POST", "/v1/bookings/update", Some(json!({ "bookingId": booking_id }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No fields to update");

    let (status, _) = send(
        &app,
        "POST",
        "/v1/bookings/update",
        Some(json!({ "bookingId": booking_id, "seats": 6 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(availability(&app, "2025-03-14").await, 2);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/bookings/update",
        Some(json!({ "bookingId": booking_id, "departureDate": "2025-03-15" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Booking updated successfully");
    assert_eq!(body["updatedAttributes"], json!({ "departureDate": "2025-03-15" }));
    assert_eq!(availability(&app, "2025-03-14").await, 5);
    assert_eq!(availability(&app, "2025-03-15").await, 7);
}

#[tokio::test]
async fn test_validation_errors() {
    let app = test_app();

    let (status, body) = send(&app, "POST", "/v1/bookings", Some(json!({ "flightId": "SL101" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields: userId, seats, departureDate");

    let request = Request::builder()
        .method("POST")
        .uri("/v1/bookings")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "POST", "/v1/bookings/cancel", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bookingId is required");
}

#[tokio::test]
async fn test_not_found() {
    let app = test_app();

    let (status, body) = send(
        &app,
        "POST",
        "/v1/bookings",
        Some(json!({ "userId": "u1", "flightId": "SL999", "seats": 1, "departureDate": "2025-03-14" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Flight not found");

    let (status, body) = send(
        &app,
        "POST",
        "/v1/bookings/cancel",
        Some(json!({ "bookingId": Uuid::new_v4().to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Booking not found");
}

#[tokio::test]
async fn test_search() {
    let app = test_app();

    let (status, body) = send(
        &app,
        "GET",
        "/v1/flights/search?departureCity=Lisbon&destinationCity=Oslo&departureDate=2025-03-14",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["flightId"], "SL101");
    assert_eq!(body[0]["seatAvailability"], 5);

    let (status, body) = send(&app, "GET", "/v1/flights/search?departureCity=Lisbon", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required query parameters");

    let (status, body) = send(
        &app,
        "GET",
        "/v1/flights/search?departureCity=Lisbon&destinationCity=Rome&departureDate=2025-03-14",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No flights found");
}

#[tokio::test]
async fn test_audit_reports_no_drift() {
    let app = test_app();
    book(&app, 2).await;
    book(&app, 1).await;

    let (status, body) = send(&app, "GET", "/v1/admin/flights/SL101/2025-03-14/audit", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["activeBookings"], 2);
    assert_eq!(body["committedSeats"], 3);
    assert_eq!(body["drift"], 0);
    assert_eq!(body["consistent"], true);
}

/// Booking store that is down for writes.
struct UnavailableBookings(Arc<MemoryStore>);

#[async_trait]
impl BookingStore for UnavailableBookings {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.0.get_booking(id).await
    }

    async fn insert_booking(&self, _booking: &Booking) -> StoreResult<()> {
        Err(StoreError::Backend("table Bookings unavailable".to_string()))
    }

    async fn transition_booking(
        &self,
        _id: Uuid,
        _guard: &BookingGuard,
        _change: &BookingChange,
    ) -> StoreResult<WriteOutcome> {
        Err(StoreError::Backend("table Bookings unavailable".to_string()))
    }

    async fn bookings_for_flight(&self, key: &FlightKey) -> StoreResult<Vec<Booking>> {
        self.0.bookings_for_flight(key).await
    }
}

#[tokio::test]
async fn test_store_failure_is_generic_500() {
    let store = Arc::new(MemoryStore::with_flights([Flight::new("SL101", day(14), 5).with_capacity(5)]));
    let ledger = InventoryLedger::new(store.clone(), Arc::new(UnavailableBookings(store.clone())));
    let app = app(AppState::new(ledger));

    let (status, body) = book(&app, 3).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Internal Server Error" }));

    // The debit was compensated.
    assert_eq!(availability(&app, "2025-03-14").await, 5);
}
