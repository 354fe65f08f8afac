//! Integration tests for the Dispatch Service API

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use dispatch_service::{create_router, AppState, Dispatcher, SelectionPolicy, Stores, SystemClock};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

fn create_test_app() -> Router {
    let dispatcher = Dispatcher::new(
        Stores::in_memory(),
        Arc::new(SystemClock),
        SelectionPolicy::default(),
    );
    create_router(AppState { dispatcher })
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn booking_body(cab_type: &str) -> Value {
    json!({
        "employee_name": "Lee",
        "pickup": "Tower A",
        "drop_location": "Central",
        "pickup_time": "17:45",
        "cab_type": cab_type,
        "hr_email": "hr@corp.test",
        "duration_min": 25
    })
}

fn driver_body(email: &str, cab_type: &str) -> Value {
    json!({ "name": "Mo", "email": email, "cab_type": cab_type })
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();
    let (status, json) = send(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "dispatch-service");
}

#[tokio::test]
async fn test_book_and_complete_trip() {
    let app = create_test_app();

    let (status, driver) = send(
        &app,
        Method::POST,
        "/api/admin/add-driver",
        Some(driver_body("mo@cabs.test", "sedan")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(driver["cabType"], "SEDAN");
    assert_eq!(driver["available"], true);

    let (status, booking) =
        send(&app, Method::POST, "/api/hr/book", Some(booking_body("SEDAN"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "ASSIGNED");
    assert_eq!(booking["driverEmail"], "mo@cabs.test");
    assert_eq!(booking["completed"], false);

    let id = booking["id"].as_u64().unwrap();
    let (status, trips) =
        send(&app, Method::GET, "/api/driver/mytrips?email=mo@cabs.test", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trips.as_array().unwrap().len(), 1);

    let uri = format!("/api/driver/complete-trip/{}", id);
    let (status, completed) = send(&app, Method::PUT, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["status"], "COMPLETED");
    assert_eq!(completed["completed"], true);

    let (_, drivers) = send(&app, Method::GET, "/api/admin/view-drivers", None).await;
    assert_eq!(drivers[0]["available"], true);
}

#[tokio::test]
async fn test_booking_without_driver_stays_booked() {
    let app = create_test_app();

    let (status, booking) =
        send(&app, Method::POST, "/api/hr/book", Some(booking_body("VAN"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "BOOKED");
    assert!(booking.get("driverEmail").is_none());

    let (status, mine) =
        send(&app, Method::GET, "/api/hr/mybookings?email=hr@corp.test", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (_, all) = send(&app, Method::GET, "/api/admin/bookings", None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_complete_unknown_booking_is_404() {
    let app = create_test_app();
    let (status, json) = send(&app, Method::PUT, "/api/driver/complete-trip/999", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("999"));
}

#[tokio::test]
async fn test_duplicate_driver_is_409() {
    let app = create_test_app();
    let body = driver_body("dup@cabs.test", "SUV");

    let (status, _) = send(&app, Method::POST, "/api/admin/add-driver", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = send(&app, Method::POST, "/api/admin/add-driver", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_invalid_booking_is_400() {
    let app = create_test_app();
    let mut body = booking_body("SEDAN");
    body["duration_min"] = json!(0);

    let (status, json) = send(&app, Method::POST, "/api/hr/book", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (_, all) = send(&app, Method::GET, "/api/admin/bookings", None).await;
    assert!(all.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_camel_case_client_payloads() {
    let app = create_test_app();

    let (status, driver) = send(
        &app,
        Method::POST,
        "/api/admin/add-driver",
        Some(json!({ "name": "Tao", "email": "tao@cabs.test", "cabType": "suv" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(driver["cabType"], "SUV");

    let (status, booking) = send(
        &app,
        Method::POST,
        "/api/hr/book",
        Some(json!({
            "employeeName": "Lee",
            "pickup": "Tower A",
            "dropLocation": "Central",
            "pickupTime": "17:45",
            "cabType": "SUV",
            "hrEmail": "hr@corp.test",
            "durationMin": 25
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "ASSIGNED");
    assert_eq!(booking["driverEmail"], "tao@cabs.test");
    assert_eq!(booking["employeeName"], "Lee");
    assert_eq!(booking["durationMin"], 25);
    assert!(booking["createdAt"].is_string());
}
