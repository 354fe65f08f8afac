//! Shared domain records for the cab dispatch workspace.
//!
//! Drivers and bookings are plain data here; storage and the
//! assignment/completion rules live in `dispatch-service`.

pub mod booking;
pub mod driver;
pub mod error;

pub use booking::{Booking, BookingStatus, NewBooking};
pub use driver::{CabType, Driver, NewDriver};
pub use error::{Error, Result};
