//! API handlers for the dispatch service

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cabdesk_common::{Driver, Error, NewBooking, NewDriver};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    dispatch::Dispatcher,
    models::{AddDriverRequest, BookCabRequest, BookingView, EmailQuery},
};

/// Shared application state
pub struct AppState {
    pub dispatcher: Dispatcher,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::BookingNotFound(_) => StatusCode::NOT_FOUND,
            Error::DriverExists(_) => StatusCode::CONFLICT,
            Error::Validation(_) | Error::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            _ => {
                error!("Request failed: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

/// Health check
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "dispatch-service"
    }))
}

/// Book a cab; a driver is assigned immediately when one is free
pub async fn book_cab_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BookCabRequest>,
) -> Result<(StatusCode, Json<BookingView>), ApiError> {
    info!("Booking request from {}", payload.hr_email);

    let request = NewBooking::try_from(payload)?;
    let booking = state.dispatcher.book_cab(request).await?;

    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// Bookings made by an HR user
pub async fn my_bookings_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let bookings = state.dispatcher.bookings_for_hr(&query.email).await?;
    Ok(Json(bookings.into_iter().map(BookingView::from).collect()))
}

/// Trips linked to a driver
pub async fn my_trips_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let trips = state.dispatcher.trips_for_driver(&query.email).await?;
    Ok(Json(trips.into_iter().map(BookingView::from).collect()))
}

/// Driver marks a trip finished
pub async fn complete_trip_handler(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<u64>,
) -> Result<Json<BookingView>, ApiError> {
    info!("Completion request for booking {}", booking_id);

    let booking = state.dispatcher.complete_trip(booking_id).await?;
    Ok(Json(booking.into()))
}

/// Register a driver
pub async fn add_driver_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddDriverRequest>,
) -> Result<(StatusCode, Json<Driver>), ApiError> {
    let driver = NewDriver::try_from(payload)?;
    let driver = state.dispatcher.register_driver(driver).await?;

    Ok((StatusCode::CREATED, Json(driver)))
}

/// All registered drivers
pub async fn view_drivers_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Driver>>, ApiError> {
    Ok(Json(state.dispatcher.drivers().await?))
}

/// All bookings
pub async fn all_bookings_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let bookings = state.dispatcher.bookings().await?;
    Ok(Json(bookings.into_iter().map(BookingView::from).collect()))
}
