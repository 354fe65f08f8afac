//! Booking record and its lifecycle rules
//!
//! A booking moves BOOKED -> ASSIGNED -> COMPLETED and never backwards.
//! Completion is the only state that accepts no further transition.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::driver::CabType;
use crate::error::{Error, Result};

/// Booking lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Waiting for a driver
    Booked,
    /// Linked to a driver who is on the trip
    Assigned,
    /// Trip finished, either by the driver or by the sweeper
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booked => "BOOKED",
            Self::Assigned => "ASSIGNED",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether moving from `self` to `next` respects the forward-only order
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (Self::Booked, Self::Assigned) | (Self::Assigned, Self::Completed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "BOOKED" => Ok(Self::Booked),
            "ASSIGNED" => Ok(Self::Assigned),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(Error::Validation(format!("unknown booking status: {}", other))),
        }
    }
}

/// A cab booking requested by an HR user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Store-assigned identifier
    pub id: u64,

    /// Employee the cab is booked for
    pub employee_name: String,

    pub pickup: String,

    pub drop_location: String,

    /// Requested pickup time, as entered by the requester
    pub pickup_time: String,

    /// Requested cab category
    pub cab_type: CabType,

    /// HR user who made the booking
    pub hr_email: String,

    /// Linked driver; set exactly when the booking has been assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_email: Option<String>,

    pub status: BookingStatus,

    /// Calendar day the booking was made
    pub booking_date: NaiveDate,

    /// Creation time; force-completion is measured from here
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Expected trip length in minutes
    pub duration_min: u32,
}

impl Booking {
    /// Create the stored record for a new request
    pub fn from_request(id: u64, request: NewBooking, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            employee_name: request.employee_name,
            pickup: request.pickup,
            drop_location: request.drop_location,
            pickup_time: request.pickup_time,
            cab_type: request.cab_type,
            hr_email: request.hr_email,
            driver_email: None,
            status: BookingStatus::Booked,
            booking_date: created_at.date_naive(),
            created_at,
            assigned_at: None,
            completed_at: None,
            duration_min: request.duration_min,
        }
    }

    /// Derived view of the status; not stored separately
    pub fn completed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Link a driver to a waiting booking
    pub fn assign(&mut self, driver_email: String, at: DateTime<Utc>) -> Result<()> {
        self.transition(BookingStatus::Assigned)?;
        self.driver_email = Some(driver_email);
        self.assigned_at = Some(at);
        Ok(())
    }

    /// Finish the trip. Only an ASSIGNED booking has a trip to finish.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(BookingStatus::Completed)?;
        self.completed_at = Some(at);
        Ok(())
    }

    /// Whole minutes elapsed since creation, rounded down
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_minutes()
    }

    /// Whether the expected duration has fully elapsed at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_minutes(now) >= i64::from(self.duration_min)
    }

    fn transition(&mut self, next: BookingStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// A validated booking request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub employee_name: String,
    pub pickup: String,
    pub drop_location: String,
    pub pickup_time: String,
    pub cab_type: CabType,
    pub hr_email: String,
    pub duration_min: u32,
}

impl NewBooking {
    pub fn validate(&self) -> Result<()> {
        if self.hr_email.trim().is_empty() {
            return Err(Error::Validation("hr email must not be empty".to_string()));
        }
        if self.duration_min == 0 {
            return Err(Error::Validation(
                "trip duration must be at least one minute".to_string(),
            ));
        }
        Ok(())
    }
}
