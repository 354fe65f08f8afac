use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Cab category a driver can serve and a booking can request.
///
/// Stored trimmed and upper-cased so `"suv"` and `"SUV "` match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CabType(String);

impl CabType {
    /// Normalize and validate a cab type
    pub fn new(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(Error::Validation("cab type must not be empty".to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CabType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CabType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for CabType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<CabType> for String {
    fn from(value: CabType) -> Self {
        value.0
    }
}

/// A registered driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    /// Display name
    pub name: String,

    /// Unique key; bookings reference drivers by this
    pub email: String,

    /// Category of cab this driver operates
    pub cab_type: CabType,

    /// False while the driver is linked to an ASSIGNED booking
    pub available: bool,

    /// Registration sequence number, used for deterministic selection
    pub seq: u64,

    /// When the driver was registered
    pub registered_at: DateTime<Utc>,
}

impl Driver {
    /// Build the stored record for a new registration. Drivers start available.
    pub fn from_registration(new: NewDriver, seq: u64, registered_at: DateTime<Utc>) -> Self {
        Self {
            name: new.name,
            email: new.email,
            cab_type: new.cab_type,
            available: true,
            seq,
            registered_at,
        }
    }
}

/// Driver registration payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDriver {
    pub name: String,
    pub email: String,
    pub cab_type: CabType,
}

impl NewDriver {
    pub fn new(name: &str, email: &str, cab_type: &str) -> Result<Self> {
        let new = Self {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            cab_type: CabType::new(cab_type)?,
        };
        new.validate()?;
        Ok(new)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Validation("driver name must not be empty".to_string()));
        }
        if self.email.is_empty() {
            return Err(Error::Validation("driver email must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cab_type_is_normalized() {
        let a = CabType::new(" sedan ").unwrap();
        let b: CabType = "SEDAN".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "SEDAN");
    }

    #[test]
    fn test_empty_cab_type_rejected() {
        assert!(matches!(CabType::new("   "), Err(Error::Validation(_))));
    }

    #[test]
    fn test_cab_type_serde_normalizes() {
        let parsed: CabType = serde_json::from_str("\"suv\"").unwrap();
        assert_eq!(parsed.as_str(), "SUV");
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"SUV\"");
        assert!(serde_json::from_str::<CabType>("\"\"").is_err());
    }

    #[test]
    fn test_new_driver_requires_email() {
        let result = NewDriver::new("Ravi", "  ", "SUV");
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_registered_driver_starts_available() {
        let new = NewDriver::new("Ravi", "ravi@cabs.test", "suv").unwrap();
        let driver = Driver::from_registration(new, 7, Utc::now());
        assert!(driver.available);
        assert_eq!(driver.seq, 7);
        assert_eq!(driver.cab_type.as_str(), "SUV");
    }
}
