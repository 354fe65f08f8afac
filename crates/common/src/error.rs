use thiserror::Error;

use crate::booking::BookingStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Booking not found: {0}")]
    BookingNotFound(u64),

    #[error("Driver already registered: {0}")]
    DriverExists(String),

    #[error("Booking {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: u64,
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
