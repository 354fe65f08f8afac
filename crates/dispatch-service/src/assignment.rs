//! Assignment engine
//!
//! Links a waiting booking to an available driver of the requested cab type.
//! Used once when a booking is created and again by every pending-assignment
//! sweep. Finding no driver is a normal outcome, not an error.
//!
//! The driver is claimed first with a compare-and-swap on its availability,
//! then the booking is written with a compare-and-swap on its status. If the
//! booking write does not land, the claim is released so neither record
//! changes.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use cabdesk_common::{Booking, BookingStatus, CabType, Driver, Error, Result};

use crate::clock::Clock;
use crate::storage::{BookingStore, CasOutcome, DriverRegistry, Stores};

/// Order in which eligible drivers are tried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Lowest registration sequence first
    #[default]
    EarliestRegistered,
    /// Lexicographically smallest email first
    LowestEmail,
}

impl SelectionPolicy {
    /// Sort candidates so the preferred driver comes first
    pub fn order(&self, drivers: &mut [Driver]) {
        match self {
            Self::EarliestRegistered => {
                drivers.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| a.email.cmp(&b.email)))
            }
            Self::LowestEmail => drivers.sort_by(|a, b| a.email.cmp(&b.email)),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "earliest_registered" => Ok(Self::EarliestRegistered),
            "lowest_email" => Ok(Self::LowestEmail),
            other => Err(Error::Validation(format!(
                "unknown selection policy: {} (expected earliest_registered or lowest_email)",
                other
            ))),
        }
    }
}

/// Result of one assignment attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    /// A driver was claimed and the booking is now ASSIGNED
    Assigned { booking: Booking, driver_email: String },
    /// No eligible driver right now; the booking stays BOOKED
    Pending,
    /// The booking was not BOOKED (or changed underneath us); nothing done
    Skipped,
}

/// Assignment engine
pub struct AssignmentEngine {
    drivers: Arc<dyn DriverRegistry>,
    bookings: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    policy: SelectionPolicy,
}

impl AssignmentEngine {
    pub fn new(stores: &Stores, clock: Arc<dyn Clock>, policy: SelectionPolicy) -> Self {
        Self {
            drivers: Arc::clone(&stores.drivers),
            bookings: Arc::clone(&stores.bookings),
            clock,
            policy,
        }
    }

    /// Try to link `booking` to an available driver.
    ///
    /// # Returns
    /// * `Ok(Assigned)` - driver claimed and booking written
    /// * `Ok(Pending)` - no available driver of that cab type
    /// * `Ok(Skipped)` - booking was not waiting; no side effects
    /// * `Err` - a store write failed; the driver claim has been released
    pub async fn try_assign(&self, booking: &Booking) -> Result<AssignOutcome> {
        if booking.status != BookingStatus::Booked || booking.driver_email.is_some() {
            debug!(
                "Booking {} is {}, not eligible for assignment",
                booking.id, booking.status
            );
            return Ok(AssignOutcome::Skipped);
        }

        let Some(driver) = self.claim_driver(&booking.cab_type).await? else {
            debug!(
                "No available {} driver for booking {}",
                booking.cab_type, booking.id
            );
            return Ok(AssignOutcome::Pending);
        };

        let mut assigned = booking.clone();
        assigned.assign(driver.email.clone(), self.clock.now())?;

        match self
            .bookings
            .compare_and_save(&assigned, BookingStatus::Booked)
            .await
        {
            Ok(CasOutcome::Applied) => {
                info!(
                    "Assigned driver {} to booking {} ({})",
                    driver.email, assigned.id, assigned.cab_type
                );
                Ok(AssignOutcome::Assigned {
                    booking: assigned,
                    driver_email: driver.email,
                })
            }
            Ok(outcome) => {
                debug!(
                    "Booking {} changed before assignment landed ({:?}), releasing {}",
                    booking.id, outcome, driver.email
                );
                self.release_driver(&driver.email).await;
                Ok(AssignOutcome::Skipped)
            }
            Err(e) => {
                self.release_driver(&driver.email).await;
                Err(e)
            }
        }
    }

    /// Claim the first candidate, in policy order, whose availability flips
    async fn claim_driver(&self, cab_type: &CabType) -> Result<Option<Driver>> {
        let mut candidates = self.drivers.find_available_by_cab_type(cab_type).await?;
        self.policy.order(&mut candidates);

        for driver in candidates {
            match self
                .drivers
                .compare_and_set_available(&driver.email, true, false)
                .await?
            {
                CasOutcome::Applied => return Ok(Some(driver)),
                outcome => {
                    debug!("Driver {} not claimable ({:?})", driver.email, outcome);
                }
            }
        }

        Ok(None)
    }

    async fn release_driver(&self, email: &str) {
        if let Err(e) = self
            .drivers
            .compare_and_set_available(email, false, true)
            .await
        {
            warn!("Failed to release driver {} after aborted assignment: {}", email, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use cabdesk_common::{NewBooking, NewDriver};
    use chrono::Utc;

    fn engine(stores: &Stores, policy: SelectionPolicy) -> AssignmentEngine {
        AssignmentEngine::new(stores, Arc::new(SystemClock), policy)
    }

    async fn add_driver(stores: &Stores, name: &str, email: &str, cab: &str) {
        stores
            .drivers
            .register(NewDriver::new(name, email, cab).unwrap(), Utc::now())
            .await
            .unwrap();
    }

    async fn add_booking(stores: &Stores, cab: &str) -> Booking {
        stores
            .bookings
            .insert(
                NewBooking {
                    employee_name: "Kiran".to_string(),
                    pickup: "Lobby".to_string(),
                    drop_location: "Hotel".to_string(),
                    pickup_time: "10:00".to_string(),
                    cab_type: CabType::new(cab).unwrap(),
                    hr_email: "hr@corp.test".to_string(),
                    duration_min: 30,
                },
                Utc::now(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_assigns_available_driver() {
        let stores = Stores::in_memory();
        add_driver(&stores, "Sam", "sam@cabs.test", "SEDAN").await;
        let booking = add_booking(&stores, "SEDAN").await;

        let outcome = engine(&stores, SelectionPolicy::default())
            .try_assign(&booking)
            .await
            .unwrap();

        let AssignOutcome::Assigned { booking, driver_email } = outcome else {
            panic!("expected assignment");
        };
        assert_eq!(driver_email, "sam@cabs.test");
        assert_eq!(booking.status, BookingStatus::Assigned);

        let driver = stores
            .drivers
            .find_by_email("sam@cabs.test")
            .await
            .unwrap()
            .unwrap();
        assert!(!driver.available);

        let stored = stores.bookings.find_by_id(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.driver_email.as_deref(), Some("sam@cabs.test"));
    }

    #[tokio::test]
    async fn test_no_matching_driver_leaves_booking_untouched() {
        let stores = Stores::in_memory();
        add_driver(&stores, "Sam", "sam@cabs.test", "SEDAN").await;
        let booking = add_booking(&stores, "SUV").await;

        let outcome = engine(&stores, SelectionPolicy::default())
            .try_assign(&booking)
            .await
            .unwrap();
        assert_eq!(outcome, AssignOutcome::Pending);

        let stored = stores.bookings.find_by_id(booking.id).await.unwrap().unwrap();
        assert_eq!(stored, booking);
        let sam = stores
            .drivers
            .find_by_email("sam@cabs.test")
            .await
            .unwrap()
            .unwrap();
        assert!(sam.available);
    }

    #[tokio::test]
    async fn test_assigned_booking_is_skipped() {
        let stores = Stores::in_memory();
        add_driver(&stores, "Sam", "sam@cabs.test", "SEDAN").await;
        add_driver(&stores, "Tia", "tia@cabs.test", "SEDAN").await;
        let booking = add_booking(&stores, "SEDAN").await;
        let engine = engine(&stores, SelectionPolicy::default());

        let AssignOutcome::Assigned { booking, .. } = engine.try_assign(&booking).await.unwrap()
        else {
            panic!("expected assignment");
        };

        let again = engine.try_assign(&booking).await.unwrap();
        assert_eq!(again, AssignOutcome::Skipped);

        let tia = stores
            .drivers
            .find_by_email("tia@cabs.test")
            .await
            .unwrap()
            .unwrap();
        assert!(tia.available);
    }

    #[tokio::test]
    async fn test_stale_snapshot_releases_claim() {
        let stores = Stores::in_memory();
        add_driver(&stores, "Sam", "sam@cabs.test", "SEDAN").await;
        add_driver(&stores, "Tia", "tia@cabs.test", "SEDAN").await;
        let snapshot = add_booking(&stores, "SEDAN").await;
        let engine = engine(&stores, SelectionPolicy::default());

        engine.try_assign(&snapshot).await.unwrap();

        // Second attempt works from the old BOOKED snapshot
        let outcome = engine.try_assign(&snapshot).await.unwrap();
        assert_eq!(outcome, AssignOutcome::Skipped);

        let available = stores
            .drivers
            .find_available_by_cab_type(&CabType::new("SEDAN").unwrap())
            .await
            .unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].email, "tia@cabs.test");
    }

    #[tokio::test]
    async fn test_selection_policy_is_deterministic() {
        let stores = Stores::in_memory();
        add_driver(&stores, "Zed", "zed@cabs.test", "SUV").await;
        add_driver(&stores, "Amy", "amy@cabs.test", "SUV").await;

        let first = add_booking(&stores, "SUV").await;
        let outcome = engine(&stores, SelectionPolicy::LowestEmail)
            .try_assign(&first)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AssignOutcome::Assigned { ref driver_email, .. } if driver_email == "amy@cabs.test"
        ));

        let stores = Stores::in_memory();
        add_driver(&stores, "Zed", "zed@cabs.test", "SUV").await;
        add_driver(&stores, "Amy", "amy@cabs.test", "SUV").await;

        let first = add_booking(&stores, "SUV").await;
        let outcome = engine(&stores, SelectionPolicy::EarliestRegistered)
            .try_assign(&first)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AssignOutcome::Assigned { ref driver_email, .. } if driver_email == "zed@cabs.test"
        ));
    }

    #[tokio::test]
    async fn test_concurrent_bookings_never_share_a_driver() {
        let stores = Stores::in_memory();
        add_driver(&stores, "Sam", "sam@cabs.test", "SEDAN").await;
        let a = add_booking(&stores, "SEDAN").await;
        let b = add_booking(&stores, "SEDAN").await;
        let engine = engine(&stores, SelectionPolicy::default());

        let (ra, rb) = tokio::join!(engine.try_assign(&a), engine.try_assign(&b));
        let outcomes = [ra.unwrap(), rb.unwrap()];

        let assigned = outcomes
            .iter()
            .filter(|o| matches!(o, AssignOutcome::Assigned { .. }))
            .count();
        let pending = outcomes
            .iter()
            .filter(|o| matches!(o, AssignOutcome::Pending))
            .count();
        assert_eq!(assigned, 1);
        assert_eq!(pending, 1);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "lowest_email".parse::<SelectionPolicy>().unwrap(),
            SelectionPolicy::LowestEmail
        );
        assert_eq!(
            " Earliest_Registered ".parse::<SelectionPolicy>().unwrap(),
            SelectionPolicy::EarliestRegistered
        );
        assert!("random".parse::<SelectionPolicy>().is_err());
    }
}
