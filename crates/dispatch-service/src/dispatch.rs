//! Entry points used by the HTTP layer
//!
//! [`Dispatcher`] wires the stores, the assignment engine and the completion
//! handler together behind one clock and selection policy.

use std::sync::Arc;
use tracing::{info, warn};

use cabdesk_common::{Booking, BookingStatus, Driver, NewBooking, NewDriver, Result};

use crate::assignment::{AssignOutcome, AssignmentEngine, SelectionPolicy};
use crate::clock::Clock;
use crate::completion::CompletionHandler;
use crate::storage::Stores;
use crate::sweeper::{ForceCompletionJob, PendingAssignmentJob, SweepSchedule, Sweeper};

pub struct Dispatcher {
    stores: Stores,
    engine: Arc<AssignmentEngine>,
    completion: CompletionHandler,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, policy: SelectionPolicy) -> Self {
        let engine = Arc::new(AssignmentEngine::new(&stores, clock.clone(), policy));
        let completion = CompletionHandler::new(&stores, clock.clone());
        Self {
            stores,
            engine,
            completion,
            clock,
        }
    }

    /// Build a sweeper sharing this dispatcher's stores, engine and clock
    pub fn sweeper(&self, schedule: SweepSchedule) -> Sweeper {
        Sweeper::new(
            Arc::new(ForceCompletionJob::new(&self.stores, self.clock.clone())),
            Arc::new(PendingAssignmentJob::new(&self.stores, self.engine.clone())),
            schedule,
        )
    }

    /// Persist a booking and try to assign a driver straight away.
    ///
    /// A failed assignment attempt does not fail the booking: it stays
    /// BOOKED and the pending-assignment sweep picks it up.
    pub async fn book_cab(&self, request: NewBooking) -> Result<Booking> {
        request.validate()?;

        let booking = self.stores.bookings.insert(request, self.clock.now()).await?;
        info!(
            "Booking {} created for {} ({})",
            booking.id, booking.employee_name, booking.cab_type
        );

        match self.engine.try_assign(&booking).await {
            Ok(AssignOutcome::Assigned { booking, .. }) => Ok(booking),
            Ok(AssignOutcome::Pending) => {
                info!("Booking {} waiting for a {} driver", booking.id, booking.cab_type);
                Ok(booking)
            }
            Ok(AssignOutcome::Skipped) => {
                // Completed or assigned concurrently; report what is stored now
                Ok(self
                    .stores
                    .bookings
                    .find_by_id(booking.id)
                    .await?
                    .unwrap_or(booking))
            }
            Err(e) => {
                warn!(
                    "Assignment attempt for booking {} failed, leaving it BOOKED: {}",
                    booking.id, e
                );
                Ok(booking)
            }
        }
    }

    /// Mark a trip finished and free its driver
    pub async fn complete_trip(&self, booking_id: u64) -> Result<Booking> {
        self.completion.complete_trip(booking_id).await
    }

    pub async fn register_driver(&self, driver: NewDriver) -> Result<Driver> {
        driver.validate()?;
        let driver = self.stores.drivers.register(driver, self.clock.now()).await?;
        info!(
            "Registered driver {} ({}, {})",
            driver.email, driver.name, driver.cab_type
        );
        Ok(driver)
    }

    pub async fn drivers(&self) -> Result<Vec<Driver>> {
        self.stores.drivers.find_all().await
    }

    pub async fn bookings(&self) -> Result<Vec<Booking>> {
        self.stores.bookings.find_all().await
    }

    /// Bookings a given HR user made
    pub async fn bookings_for_hr(&self, hr_email: &str) -> Result<Vec<Booking>> {
        self.stores.bookings.find_by_hr_email(hr_email).await
    }

    /// Bookings a driver is or was linked to, current trip first
    pub async fn trips_for_driver(&self, driver_email: &str) -> Result<Vec<Booking>> {
        let mut trips = self.stores.bookings.find_by_driver_email(driver_email).await?;
        trips.sort_by_key(|b| (b.status != BookingStatus::Assigned, std::cmp::Reverse(b.id)));
        Ok(trips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use cabdesk_common::{CabType, Error};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Stores::in_memory(),
            Arc::new(SystemClock),
            SelectionPolicy::default(),
        )
    }

    fn request(cab: &str) -> NewBooking {
        NewBooking {
            employee_name: "Ola".to_string(),
            pickup: "HQ".to_string(),
            drop_location: "Airport".to_string(),
            pickup_time: "18:30".to_string(),
            cab_type: CabType::new(cab).unwrap(),
            hr_email: "hr@corp.test".to_string(),
            duration_min: 45,
        }
    }

    #[tokio::test]
    async fn test_book_cab_assigns_when_driver_available() {
        let d = dispatcher();
        d.register_driver(NewDriver::new("Ravi", "ravi@cabs.test", "suv").unwrap())
            .await
            .unwrap();

        let booking = d.book_cab(request("SUV")).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Assigned);
        assert_eq!(booking.driver_email.as_deref(), Some("ravi@cabs.test"));
    }

    #[tokio::test]
    async fn test_book_cab_without_driver_stays_booked() {
        let d = dispatcher();
        let booking = d.book_cab(request("SUV")).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Booked);
        assert!(booking.driver_email.is_none());
        assert_eq!(d.bookings_for_hr("hr@corp.test").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_book_cab_rejects_invalid_request() {
        let d = dispatcher();
        let mut bad = request("SUV");
        bad.duration_min = 0;

        assert!(matches!(d.book_cab(bad).await, Err(Error::Validation(_))));
        assert!(d.bookings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_driver_rejected() {
        let d = dispatcher();
        let driver = NewDriver::new("Ravi", "ravi@cabs.test", "SUV").unwrap();
        d.register_driver(driver.clone()).await.unwrap();

        let err = d.register_driver(driver).await.unwrap_err();
        assert!(matches!(err, Error::DriverExists(_)));
        assert_eq!(d.drivers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_trips_for_driver_lists_current_trip_first() {
        let d = dispatcher();
        d.register_driver(NewDriver::new("Ravi", "ravi@cabs.test", "SUV").unwrap())
            .await
            .unwrap();

        let first = d.book_cab(request("SUV")).await.unwrap();
        d.complete_trip(first.id).await.unwrap();
        let second = d.book_cab(request("SUV")).await.unwrap();
        assert_eq!(second.status, BookingStatus::Assigned);

        let trips = d.trips_for_driver("ravi@cabs.test").await.unwrap();
        let ids: Vec<u64> = trips.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
