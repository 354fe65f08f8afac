//! Persistence for drivers and bookings.
//!
//! The two stores are independent; bookings reference drivers by email only.
//! Every mutation the dispatch rules depend on is exposed as a
//! compare-and-swap so two writers can never both claim the same driver or
//! both move the same booking.
//!
//! - [`MemoryStore`]: single-process maps, used by tests and local runs
//! - [`RedisStore`]: shared Redis backend, CAS done server-side in Lua

pub mod memory;
pub mod redis_store;

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use cabdesk_common::{Booking, BookingStatus, CabType, Driver, NewBooking, NewDriver, Result};

use crate::config::{Config, StoreBackend};

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Result of a compare-and-swap write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The expected value matched and the write was applied
    Applied,
    /// The row exists but holds a different value; nothing written
    Mismatch,
    /// No such row
    NotFound,
}

/// Driver registry
#[async_trait]
pub trait DriverRegistry: Send + Sync {
    /// Register a new driver; fails with `DriverExists` on a duplicate email
    async fn register(&self, driver: NewDriver, registered_at: DateTime<Utc>) -> Result<Driver>;

    /// All drivers in registration order
    async fn find_all(&self) -> Result<Vec<Driver>>;

    /// Available drivers of one cab type, in registration order
    async fn find_available_by_cab_type(&self, cab_type: &CabType) -> Result<Vec<Driver>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Driver>>;

    /// Insert or replace a driver record
    async fn save(&self, driver: &Driver) -> Result<()>;

    /// Set `available` only if it currently equals `expected`
    async fn compare_and_set_available(
        &self,
        email: &str,
        expected: bool,
        available: bool,
    ) -> Result<CasOutcome>;
}

/// Booking store
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Persist a new request as BOOKED under the next id
    async fn insert(&self, request: NewBooking, created_at: DateTime<Utc>) -> Result<Booking>;

    async fn find_all(&self) -> Result<Vec<Booking>>;

    async fn find_by_id(&self, id: u64) -> Result<Option<Booking>>;

    async fn find_by_status(&self, status: BookingStatus) -> Result<Vec<Booking>>;

    async fn find_by_hr_email(&self, email: &str) -> Result<Vec<Booking>>;

    async fn find_by_driver_email(&self, email: &str) -> Result<Vec<Booking>>;

    /// Insert or replace a booking unconditionally
    async fn save(&self, booking: &Booking) -> Result<()>;

    /// Replace the booking only if its stored status still equals `expected`
    async fn compare_and_save(&self, booking: &Booking, expected: BookingStatus)
        -> Result<CasOutcome>;
}

/// The pair of stores the dispatch rules operate on
#[derive(Clone)]
pub struct Stores {
    pub drivers: Arc<dyn DriverRegistry>,
    pub bookings: Arc<dyn BookingStore>,
}

impl Stores {
    /// Both stores backed by one in-memory instance
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            drivers: store.clone(),
            bookings: store,
        }
    }

    /// Open the backend selected in the configuration
    pub async fn connect(config: &Config) -> AnyResult<Self> {
        match config.store_backend {
            StoreBackend::Memory => {
                info!("Using in-memory store");
                Ok(Self::in_memory())
            }
            StoreBackend::Redis => {
                let store = RedisStore::new(&config.redis_url)
                    .await
                    .context("Failed to connect to Redis")?;
                store
                    .health_check()
                    .await
                    .context("Redis health check failed")?;

                let store = Arc::new(store);
                Ok(Self {
                    drivers: store.clone(),
                    bookings: store,
                })
            }
        }
    }
}
