//! Manual trip completion
//!
//! A driver marks a trip finished before the sweeper would. The booking is
//! completed and its driver becomes available again. A driver reference that
//! no longer resolves is tolerated: the trip still completes.

use std::sync::Arc;
use tracing::{debug, info, warn};

use cabdesk_common::{Booking, Error, Result};

use crate::clock::Clock;
use crate::storage::{BookingStore, CasOutcome, DriverRegistry, Stores};

/// Status only moves forward, so a booking can change under us at most twice
const MAX_ATTEMPTS: usize = 3;

/// Make a driver available again after their trip ended.
///
/// Returns `Ok(true)` if the flag flipped, `Ok(false)` if the driver is
/// unknown or was already available.
pub(crate) async fn free_driver(drivers: &dyn DriverRegistry, email: &str) -> Result<bool> {
    match drivers.compare_and_set_available(email, false, true).await? {
        CasOutcome::Applied => {
            info!("Driver {} is available again", email);
            Ok(true)
        }
        CasOutcome::Mismatch => {
            debug!("Driver {} was already available", email);
            Ok(false)
        }
        CasOutcome::NotFound => {
            warn!("Driver {} not found; nothing to free", email);
            Ok(false)
        }
    }
}

/// Handles explicit completion requests
pub struct CompletionHandler {
    drivers: Arc<dyn DriverRegistry>,
    bookings: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl CompletionHandler {
    pub fn new(stores: &Stores, clock: Arc<dyn Clock>) -> Self {
        Self {
            drivers: Arc::clone(&stores.drivers),
            bookings: Arc::clone(&stores.bookings),
            clock,
        }
    }

    /// Complete a trip by booking id.
    ///
    /// An already completed booking is returned as-is and no driver is
    /// touched, since that driver may be serving another trip by now. A
    /// booking still waiting for a driver fails with `InvalidTransition`.
    pub async fn complete_trip(&self, booking_id: u64) -> Result<Booking> {
        for _ in 0..MAX_ATTEMPTS {
            let booking = self
                .bookings
                .find_by_id(booking_id)
                .await?
                .ok_or(Error::BookingNotFound(booking_id))?;

            if booking.completed() {
                debug!("Booking {} already completed", booking_id);
                return Ok(booking);
            }

            let expected = booking.status;
            let mut completed = booking;
            completed.complete(self.clock.now())?;

            match self.bookings.compare_and_save(&completed, expected).await? {
                CasOutcome::Applied => {
                    info!("Booking {} completed by driver", booking_id);
                    self.release(&completed).await;
                    return Ok(completed);
                }
                CasOutcome::Mismatch => {
                    debug!("Booking {} changed concurrently, re-reading", booking_id);
                }
                CasOutcome::NotFound => return Err(Error::BookingNotFound(booking_id)),
            }
        }

        Err(Error::Storage(format!(
            "booking {} kept changing during completion",
            booking_id
        )))
    }

    async fn release(&self, booking: &Booking) {
        let Some(email) = booking.driver_email.as_deref() else {
            warn!("Booking {} was ASSIGNED without a driver", booking.id);
            return;
        };

        // The booking is already completed; a failure here only leaves the
        // driver flagged busy
        if let Err(e) = free_driver(self.drivers.as_ref(), email).await {
            warn!(
                "Failed to free driver {} for booking {}: {}",
                email, booking.id, e
            );
        }
    }
}
