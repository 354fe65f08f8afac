//! Dispatch Service
//!
//! Assigns drivers to cab bookings and keeps the trip lifecycle consistent.
//! Bookings are assigned on creation when a driver is free; two background
//! sweeps force-complete overdue trips and retry waiting bookings.

pub mod assignment;
pub mod clock;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod models;
pub mod storage;
pub mod sweeper;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use assignment::{AssignOutcome, AssignmentEngine, SelectionPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use completion::CompletionHandler;
pub use config::{Config, StoreBackend};
pub use dispatch::Dispatcher;
pub use handlers::AppState;
pub use storage::{BookingStore, CasOutcome, DriverRegistry, MemoryStore, RedisStore, Stores};
pub use sweeper::{
    AssignmentReport, CompletionReport, ForceCompletionJob, PendingAssignmentJob, SweepSchedule,
    Sweeper,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/hr/book", post(handlers::book_cab_handler))
        .route("/api/hr/mybookings", get(handlers::my_bookings_handler))
        .route("/api/driver/mytrips", get(handlers::my_trips_handler))
        .route(
            "/api/driver/complete-trip/{booking_id}",
            put(handlers::complete_trip_handler),
        )
        .route("/api/admin/add-driver", post(handlers::add_driver_handler))
        .route("/api/admin/view-drivers", get(handlers::view_drivers_handler))
        .route("/api/admin/bookings", get(handlers::all_bookings_handler))
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
