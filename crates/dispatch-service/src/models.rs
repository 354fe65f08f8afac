//! Request and response bodies for the HTTP API

use serde::{Deserialize, Serialize};

use cabdesk_common::{Booking, CabType, Error, NewBooking, NewDriver};

/// Request to book a cab
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookCabRequest {
    #[serde(alias = "employee_name")]
    pub employee_name: String,
    pub pickup: String,
    #[serde(alias = "drop_location", alias = "drop")]
    pub drop_location: String,
    #[serde(alias = "pickup_time")]
    pub pickup_time: String,
    #[serde(alias = "cab_type")]
    pub cab_type: String,
    #[serde(alias = "hr_email")]
    pub hr_email: String,
    /// Expected trip length in minutes
    #[serde(alias = "duration_min")]
    pub duration_min: u32,
}

impl TryFrom<BookCabRequest> for NewBooking {
    type Error = Error;

    fn try_from(req: BookCabRequest) -> Result<Self, Self::Error> {
        let booking = NewBooking {
            employee_name: req.employee_name.trim().to_string(),
            pickup: req.pickup.trim().to_string(),
            drop_location: req.drop_location.trim().to_string(),
            pickup_time: req.pickup_time.trim().to_string(),
            cab_type: CabType::new(&req.cab_type)?,
            hr_email: req.hr_email.trim().to_string(),
            duration_min: req.duration_min,
        };
        booking.validate()?;
        Ok(booking)
    }
}

/// Request to register a driver
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDriverRequest {
    pub name: String,
    pub email: String,
    #[serde(alias = "cab_type")]
    pub cab_type: String,
}

impl TryFrom<AddDriverRequest> for NewDriver {
    type Error = Error;

    fn try_from(req: AddDriverRequest) -> Result<Self, Self::Error> {
        NewDriver::new(&req.name, &req.email, &req.cab_type)
    }
}

/// `?email=` query parameter
#[derive(Debug, Clone, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

/// Booking as returned by the API, with the derived `completed` flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub completed: bool,
}

impl From<Booking> for BookingView {
    fn from(booking: Booking) -> Self {
        let completed = booking.completed();
        Self { booking, completed }
    }
}
