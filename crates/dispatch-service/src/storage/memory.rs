//! In-memory store
//!
//! Implements both [`DriverRegistry`] and [`BookingStore`] over
//! `RwLock`-guarded maps. Each compare-and-swap holds the write lock across
//! the check and the write. State is lost when the process exits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use cabdesk_common::{
    Booking, BookingStatus, CabType, Driver, Error, NewBooking, NewDriver, Result,
};

use super::{BookingStore, CasOutcome, DriverRegistry};

#[derive(Debug, Default)]
struct DriverTable {
    by_email: HashMap<String, Driver>,
    next_seq: u64,
}

#[derive(Debug, Default)]
struct BookingTable {
    rows: BTreeMap<u64, Booking>,
    next_id: u64,
}

/// In-memory driver registry and booking store
#[derive(Debug, Default)]
pub struct MemoryStore {
    drivers: RwLock<DriverTable>,
    bookings: RwLock<BookingTable>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Storage("lock poisoned".to_string())
}

fn by_seq(mut drivers: Vec<Driver>) -> Vec<Driver> {
    drivers.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| a.email.cmp(&b.email)));
    drivers
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn filter_bookings<F>(&self, keep: F) -> Result<Vec<Booking>>
    where
        F: Fn(&Booking) -> bool,
    {
        let table = self.bookings.read().map_err(poison_err)?;
        Ok(table.rows.values().filter(|b| keep(b)).cloned().collect())
    }
}

#[async_trait]
impl DriverRegistry for MemoryStore {
    async fn register(&self, driver: NewDriver, registered_at: DateTime<Utc>) -> Result<Driver> {
        let mut table = self.drivers.write().map_err(poison_err)?;
        if table.by_email.contains_key(&driver.email) {
            return Err(Error::DriverExists(driver.email));
        }

        table.next_seq += 1;
        let record = Driver::from_registration(driver, table.next_seq, registered_at);
        table.by_email.insert(record.email.clone(), record.clone());

        debug!("Registered driver {} (seq {})", record.email, record.seq);
        Ok(record)
    }

    async fn find_all(&self) -> Result<Vec<Driver>> {
        let table = self.drivers.read().map_err(poison_err)?;
        Ok(by_seq(table.by_email.values().cloned().collect()))
    }

    async fn find_available_by_cab_type(&self, cab_type: &CabType) -> Result<Vec<Driver>> {
        let table = self.drivers.read().map_err(poison_err)?;
        Ok(by_seq(
            table
                .by_email
                .values()
                .filter(|d| d.available && &d.cab_type == cab_type)
                .cloned()
                .collect(),
        ))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Driver>> {
        let table = self.drivers.read().map_err(poison_err)?;
        Ok(table.by_email.get(email).cloned())
    }

    async fn save(&self, driver: &Driver) -> Result<()> {
        let mut table = self.drivers.write().map_err(poison_err)?;
        table.next_seq = table.next_seq.max(driver.seq);
        table.by_email.insert(driver.email.clone(), driver.clone());
        Ok(())
    }

    async fn compare_and_set_available(
        &self,
        email: &str,
        expected: bool,
        available: bool,
    ) -> Result<CasOutcome> {
        let mut table = self.drivers.write().map_err(poison_err)?;
        let Some(driver) = table.by_email.get_mut(email) else {
            return Ok(CasOutcome::NotFound);
        };
        if driver.available != expected {
            return Ok(CasOutcome::Mismatch);
        }
        driver.available = available;
        Ok(CasOutcome::Applied)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert(&self, request: NewBooking, created_at: DateTime<Utc>) -> Result<Booking> {
        let mut table = self.bookings.write().map_err(poison_err)?;
        table.next_id += 1;
        let booking = Booking::from_request(table.next_id, request, created_at);
        table.rows.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn find_all(&self) -> Result<Vec<Booking>> {
        self.filter_bookings(|_| true)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Booking>> {
        let table = self.bookings.read().map_err(poison_err)?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn find_by_status(&self, status: BookingStatus) -> Result<Vec<Booking>> {
        self.filter_bookings(|b| b.status == status)
    }

    async fn find_by_hr_email(&self, email: &str) -> Result<Vec<Booking>> {
        self.filter_bookings(|b| b.hr_email == email)
    }

    async fn find_by_driver_email(&self, email: &str) -> Result<Vec<Booking>> {
        self.filter_bookings(|b| b.driver_email.as_deref() == Some(email))
    }

    async fn save(&self, booking: &Booking) -> Result<()> {
        let mut table = self.bookings.write().map_err(poison_err)?;
        table.next_id = table.next_id.max(booking.id);
        table.rows.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn compare_and_save(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<CasOutcome> {
        let mut table = self.bookings.write().map_err(poison_err)?;
        let Some(current) = table.rows.get_mut(&booking.id) else {
            return Ok(CasOutcome::NotFound);
        };
        if current.status != expected {
            return Ok(CasOutcome::Mismatch);
        }
        *current = booking.clone();
        Ok(CasOutcome::Applied)
    }
}
