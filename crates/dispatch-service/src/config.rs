//! Configuration management for the dispatch service
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::assignment::SelectionPolicy;
use crate::sweeper::SweepSchedule;

/// Which store backs drivers and bookings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => anyhow::bail!("unknown store backend: {} (expected memory or redis)", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Store backend
    pub store_backend: StoreBackend,

    /// Redis connection URL (used when the backend is redis)
    pub redis_url: String,

    /// Seconds between force-completion passes
    pub completion_sweep_interval_secs: u64,

    /// Seconds between pending-assignment passes
    pub assignment_sweep_interval_secs: u64,

    /// Driver selection order
    pub selection_policy: SelectionPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let sweep_interval = var("SWEEP_INTERVAL_SECS", "30");

        let config = Config {
            api_host: var("API_HOST", "0.0.0.0"),

            api_port: var("API_PORT", "8080")
                .parse()
                .context("Invalid API_PORT")?,

            store_backend: var("STORE_BACKEND", "memory")
                .parse()
                .context("Invalid STORE_BACKEND")?,

            redis_url: var("REDIS_URL", "redis://127.0.0.1:6379"),

            completion_sweep_interval_secs: var("COMPLETION_SWEEP_INTERVAL_SECS", &sweep_interval)
                .parse()
                .context("Invalid COMPLETION_SWEEP_INTERVAL_SECS")?,

            assignment_sweep_interval_secs: var("ASSIGNMENT_SWEEP_INTERVAL_SECS", &sweep_interval)
                .parse()
                .context("Invalid ASSIGNMENT_SWEEP_INTERVAL_SECS")?,

            selection_policy: var("SELECTION_POLICY", "earliest_registered")
                .parse()
                .context("Invalid SELECTION_POLICY")?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.completion_sweep_interval_secs == 0 {
            anyhow::bail!("COMPLETION_SWEEP_INTERVAL_SECS must be greater than 0");
        }

        if self.assignment_sweep_interval_secs == 0 {
            anyhow::bail!("ASSIGNMENT_SWEEP_INTERVAL_SECS must be greater than 0");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn sweep_schedule(&self) -> SweepSchedule {
        SweepSchedule {
            completion_interval: Duration::from_secs(self.completion_sweep_interval_secs),
            assignment_interval: Duration::from_secs(self.assignment_sweep_interval_secs),
        }
    }
}
