//! Redis storage for drivers and bookings
//!
//! Data model:
//! - driver:{email} → Hash with driver fields
//! - drivers:all → Sorted set (score=registration seq, member=email)
//! - drivers:available:{CAB_TYPE} → Set of available driver emails
//! - drivers:seq → Registration counter
//! - booking:{id} → Hash { status, data (JSON record) }
//! - bookings:all → Sorted set (score=id, member=id)
//! - bookings:status:{STATUS} → Set of booking ids
//! - bookings:hr:{email} / bookings:driver:{email} → Sets of booking ids
//! - bookings:next_id → Id counter
//!
//! Both compare-and-swap operations run as Lua scripts so the check and the
//! write happen atomically on the server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use std::collections::HashMap;
use tracing::{debug, info};

use cabdesk_common::{
    Booking, BookingStatus, CabType, Driver, Error, NewBooking, NewDriver, Result,
};

use super::{BookingStore, CasOutcome, DriverRegistry};

const DRIVERS_ALL: &str = "drivers:all";
const DRIVERS_SEQ: &str = "drivers:seq";
const DRIVERS_AVAILABLE_PREFIX: &str = "drivers:available:";
const BOOKINGS_ALL: &str = "bookings:all";
const BOOKINGS_NEXT_ID: &str = "bookings:next_id";

/// KEYS = driver hash, seq counter, registration index, availability set
/// ARGV = name, email, cab type, registered_at
/// Returns the new seq, or 0 when the email is taken
const REGISTER_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
local seq = redis.call('INCR', KEYS[2])
redis.call('HSET', KEYS[1],
  'name', ARGV[1],
  'email', ARGV[2],
  'cab_type', ARGV[3],
  'available', 'true',
  'seq', seq,
  'registered_at', ARGV[4])
redis.call('ZADD', KEYS[3], seq, ARGV[2])
redis.call('SADD', KEYS[4], ARGV[2])
return seq
"#;

/// KEYS[1] = driver hash
/// ARGV = expected availability, new availability, availability set prefix
const DRIVER_CAS_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'available')
if not current then
  return -1
end
if current ~= ARGV[1] then
  return 0
end
redis.call('HSET', KEYS[1], 'available', ARGV[2])
local cab_type = redis.call('HGET', KEYS[1], 'cab_type')
local email = redis.call('HGET', KEYS[1], 'email')
if ARGV[2] == 'true' then
  redis.call('SADD', ARGV[3] .. cab_type, email)
else
  redis.call('SREM', ARGV[3] .. cab_type, email)
end
return 1
"#;

/// KEYS = booking hash, expected status set, new status set, driver index
/// ARGV = expected status, new status, JSON record, booking id, driver email
const BOOKING_CAS_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'status')
if not current then
  return -1
end
if current ~= ARGV[1] then
  return 0
end
redis.call('HSET', KEYS[1], 'status', ARGV[2], 'data', ARGV[3])
redis.call('SREM', KEYS[2], ARGV[4])
redis.call('SADD', KEYS[3], ARGV[4])
if ARGV[5] ~= '' then
  redis.call('SADD', KEYS[4], ARGV[4])
end
return 1
"#;

fn redis_err(e: redis::RedisError) -> Error {
    Error::Redis(e.to_string())
}

fn driver_key(email: &str) -> String {
    format!("driver:{}", email)
}

fn available_key(cab_type: &CabType) -> String {
    format!("{}{}", DRIVERS_AVAILABLE_PREFIX, cab_type)
}

fn booking_key(id: u64) -> String {
    format!("booking:{}", id)
}

fn status_key(status: BookingStatus) -> String {
    format!("bookings:status:{}", status)
}

fn hr_key(email: &str) -> String {
    format!("bookings:hr:{}", email)
}

fn driver_bookings_key(email: &str) -> String {
    format!("bookings:driver:{}", email)
}

fn cas_outcome(code: i64) -> CasOutcome {
    match code {
        1 => CasOutcome::Applied,
        0 => CasOutcome::Mismatch,
        _ => CasOutcome::NotFound,
    }
}

/// Index sets that still list the booking under values it no longer has
fn stale_index_keys(previous: &Booking, next: &Booking) -> Vec<String> {
    let mut keys = Vec::new();
    if previous.status != next.status {
        keys.push(status_key(previous.status));
    }
    if previous.hr_email != next.hr_email {
        keys.push(hr_key(&previous.hr_email));
    }
    if let Some(old_driver) = &previous.driver_email {
        if next.driver_email.as_ref() != Some(old_driver) {
            keys.push(driver_bookings_key(old_driver));
        }
    }
    keys
}

fn field<'a>(map: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    map.get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::Storage(format!("driver record missing field '{}'", name)))
}

/// Reconstruct a driver from its hash fields
fn parse_driver(map: &HashMap<String, String>) -> Result<Driver> {
    let registered_at = DateTime::parse_from_rfc3339(field(map, "registered_at")?)
        .map_err(|e| Error::Storage(format!("invalid registered_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(Driver {
        name: field(map, "name")?.to_string(),
        email: field(map, "email")?.to_string(),
        cab_type: CabType::new(field(map, "cab_type")?)?,
        available: field(map, "available")? == "true",
        seq: field(map, "seq")?
            .parse()
            .map_err(|_| Error::Storage("invalid driver seq".to_string()))?,
        registered_at,
    })
}

/// Redis-backed driver registry and booking store
pub struct RedisStore {
    conn: ConnectionManager,
    register: Script,
    driver_cas: Script,
    booking_cas: Script,
}

impl RedisStore {
    /// Create a new storage client
    pub async fn new(redis_url: &str) -> Result<Self> {
        info!("Connecting to Redis at {}", redis_url);

        let client = redis::Client::open(redis_url).map_err(redis_err)?;
        let conn = ConnectionManager::new(client).await.map_err(redis_err)?;

        info!("Successfully connected to Redis");

        Ok(Self {
            conn,
            register: Script::new(REGISTER_SCRIPT),
            driver_cas: Script::new(DRIVER_CAS_SCRIPT),
            booking_cas: Script::new(BOOKING_CAS_SCRIPT),
        })
    }

    /// Health check - verify Redis connection
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn write_driver(&self, driver: &Driver) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = driver_key(&driver.email);

        let _: () = conn
            .hset_multiple(
                &key,
                &[
                    ("name", driver.name.clone()),
                    ("email", driver.email.clone()),
                    ("cab_type", driver.cab_type.to_string()),
                    ("available", driver.available.to_string()),
                    ("seq", driver.seq.to_string()),
                    ("registered_at", driver.registered_at.to_rfc3339()),
                ],
            )
            .await
            .map_err(redis_err)?;

        let _: () = conn
            .zadd(DRIVERS_ALL, &driver.email, driver.seq)
            .await
            .map_err(redis_err)?;

        let pool = available_key(&driver.cab_type);
        if driver.available {
            let _: () = conn.sadd(&pool, &driver.email).await.map_err(redis_err)?;
        } else {
            let _: () = conn.srem(&pool, &driver.email).await.map_err(redis_err)?;
        }

        Ok(())
    }

    async fn load_driver(&self, email: &str) -> Result<Option<Driver>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(driver_key(email))
            .await
            .map_err(redis_err)?;

        if fields.is_empty() {
            return Ok(None);
        }
        parse_driver(&fields).map(Some)
    }

    async fn load_drivers(&self, emails: Vec<String>) -> Result<Vec<Driver>> {
        let mut drivers = Vec::with_capacity(emails.len());
        for email in emails {
            if let Some(driver) = self.load_driver(&email).await? {
                drivers.push(driver);
            }
        }
        drivers.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| a.email.cmp(&b.email)));
        Ok(drivers)
    }

    async fn write_booking(&self, booking: &Booking) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(booking)?;

        let _: () = conn
            .hset_multiple(
                booking_key(booking.id),
                &[("status", booking.status.as_str()), ("data", json.as_str())],
            )
            .await
            .map_err(redis_err)?;
        let _: () = conn
            .zadd(BOOKINGS_ALL, booking.id, booking.id)
            .await
            .map_err(redis_err)?;
        let _: () = conn
            .sadd(status_key(booking.status), booking.id)
            .await
            .map_err(redis_err)?;
        let _: () = conn
            .sadd(hr_key(&booking.hr_email), booking.id)
            .await
            .map_err(redis_err)?;
        if let Some(driver_email) = &booking.driver_email {
            let _: () = conn
                .sadd(driver_bookings_key(driver_email), booking.id)
                .await
                .map_err(redis_err)?;
        }

        Ok(())
    }

    async fn load_bookings(&self, mut ids: Vec<u64>) -> Result<Vec<Booking>> {
        ids.sort_unstable();
        ids.dedup();

        let mut bookings = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(booking) = self.find_by_id(id).await? {
                bookings.push(booking);
            }
        }
        Ok(bookings)
    }

    async fn booking_set(&self, key: String) -> Result<Vec<Booking>> {
        let mut conn = self.conn.clone();
        let ids: Vec<u64> = conn.smembers(key).await.map_err(redis_err)?;
        self.load_bookings(ids).await
    }
}

#[async_trait]
impl DriverRegistry for RedisStore {
    async fn register(&self, driver: NewDriver, registered_at: DateTime<Utc>) -> Result<Driver> {
        let mut conn = self.conn.clone();

        // Uniqueness check, seq allocation and the record land together
        let seq: u64 = self
            .register
            .key(driver_key(&driver.email))
            .key(DRIVERS_SEQ)
            .key(DRIVERS_ALL)
            .key(available_key(&driver.cab_type))
            .arg(&driver.name)
            .arg(&driver.email)
            .arg(driver.cab_type.as_str())
            .arg(registered_at.to_rfc3339())
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;
        if seq == 0 {
            debug!("Driver {} already registered", driver.email);
            return Err(Error::DriverExists(driver.email));
        }

        let record = Driver::from_registration(driver, seq, registered_at);
        info!("Registered driver {} (seq {})", record.email, record.seq);
        Ok(record)
    }

    async fn find_all(&self) -> Result<Vec<Driver>> {
        let mut conn = self.conn.clone();
        let emails: Vec<String> = conn.zrange(DRIVERS_ALL, 0, -1).await.map_err(redis_err)?;
        self.load_drivers(emails).await
    }

    async fn find_available_by_cab_type(&self, cab_type: &CabType) -> Result<Vec<Driver>> {
        let mut conn = self.conn.clone();
        let emails: Vec<String> = conn
            .smembers(available_key(cab_type))
            .await
            .map_err(redis_err)?;

        let drivers = self.load_drivers(emails).await?;
        Ok(drivers
            .into_iter()
            .filter(|d| d.available && &d.cab_type == cab_type)
            .collect())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Driver>> {
        self.load_driver(email).await
    }

    async fn save(&self, driver: &Driver) -> Result<()> {
        if let Some(previous) = self.load_driver(&driver.email).await? {
            if previous.cab_type != driver.cab_type {
                let mut conn = self.conn.clone();
                let _: () = conn
                    .srem(available_key(&previous.cab_type), &driver.email)
                    .await
                    .map_err(redis_err)?;
            }
        }
        self.write_driver(driver).await
    }

    async fn compare_and_set_available(
        &self,
        email: &str,
        expected: bool,
        available: bool,
    ) -> Result<CasOutcome> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .driver_cas
            .key(driver_key(email))
            .arg(expected.to_string())
            .arg(available.to_string())
            .arg(DRIVERS_AVAILABLE_PREFIX)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(cas_outcome(code))
    }
}

#[async_trait]
impl BookingStore for RedisStore {
    async fn insert(&self, request: NewBooking, created_at: DateTime<Utc>) -> Result<Booking> {
        let mut conn = self.conn.clone();
        let id: u64 = conn.incr(BOOKINGS_NEXT_ID, 1).await.map_err(redis_err)?;

        let booking = Booking::from_request(id, request, created_at);
        self.write_booking(&booking).await?;

        debug!("Inserted booking {} for {}", booking.id, booking.hr_email);
        Ok(booking)
    }

    async fn find_all(&self) -> Result<Vec<Booking>> {
        let mut conn = self.conn.clone();
        let ids: Vec<u64> = conn.zrange(BOOKINGS_ALL, 0, -1).await.map_err(redis_err)?;
        self.load_bookings(ids).await
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Booking>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn
            .hget(booking_key(id), "data")
            .await
            .map_err(redis_err)?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn find_by_status(&self, status: BookingStatus) -> Result<Vec<Booking>> {
        let bookings = self.booking_set(status_key(status)).await?;
        Ok(bookings.into_iter().filter(|b| b.status == status).collect())
    }

    async fn find_by_hr_email(&self, email: &str) -> Result<Vec<Booking>> {
        self.booking_set(hr_key(email)).await
    }

    async fn find_by_driver_email(&self, email: &str) -> Result<Vec<Booking>> {
        let bookings = self.booking_set(driver_bookings_key(email)).await?;
        Ok(bookings
            .into_iter()
            .filter(|b| b.driver_email.as_deref() == Some(email))
            .collect())
    }

    async fn save(&self, booking: &Booking) -> Result<()> {
        if let Some(previous) = self.find_by_id(booking.id).await? {
            let mut conn = self.conn.clone();
            for key in stale_index_keys(&previous, booking) {
                let _: () = conn.srem(key, booking.id).await.map_err(redis_err)?;
            }
        }
        self.write_booking(booking).await
    }

    async fn compare_and_save(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<CasOutcome> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(booking)?;
        let driver_email = booking.driver_email.clone().unwrap_or_default();

        let code: i64 = self
            .booking_cas
            .key(booking_key(booking.id))
            .key(status_key(expected))
            .key(status_key(booking.status))
            .key(driver_bookings_key(&driver_email))
            .arg(expected.as_str())
            .arg(booking.status.as_str())
            .arg(json)
            .arg(booking.id)
            .arg(driver_email)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(cas_outcome(code))
    }
}
