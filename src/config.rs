//! Configuration and policy constants

use crate::error::{Error, Result};
use crate::phone::normalize_phone;
use std::path::PathBuf;
use std::time::Duration;

/// The single driver every ride request is texted to
pub const DEFAULT_DRIVER_PHONE: &str = "+15555550100";

pub const DEFAULT_PORT: u16 = 3001;

/// Records older than this are swept regardless of status
pub const RETENTION_MINUTES: i64 = 30;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Client poller policy
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const POLL_TIMEOUT: Duration = Duration::from_secs(120);

/// Twilio credentials and sending number
#[derive(Debug, Clone, PartialEq)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// All configurable values for the service
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub driver_phone: String,
    pub retention: chrono::Duration,
    pub sweep_interval: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// `None` means outbound SMS is simulated
    pub twilio: Option<TwilioConfig>,
    /// `None` keeps rides in memory only
    pub db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            driver_phone: DEFAULT_DRIVER_PHONE.to_string(),
            retention: chrono::Duration::minutes(RETENTION_MINUTES),
            sweep_interval: SWEEP_INTERVAL,
            poll_interval: POLL_INTERVAL,
            poll_timeout: POLL_TIMEOUT,
            twilio: None,
            db_path: None,
        }
    }
}

impl Config {
    /// Defaults overlaid with process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(port) = get("PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("PORT={:?}: {}", port, e)))?;
        }

        if let Some(phone) = get("DRIVER_PHONE_NUMBER") {
            config.driver_phone = normalize_phone(&phone);
        }

        config.twilio = match (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number: normalize_phone(&from),
            }),
            _ => None,
        };

        config.db_path = get("RIDE_DISPATCH_DB").map(PathBuf::from);

        Ok(config)
    }

    /// Config for tests: in-memory store, no Twilio, short poll policy
    pub fn for_test() -> Self {
        Self {
            port: 0,
            poll_interval: Duration::from_millis(10),
            poll_timeout: Duration::from_millis(200),
            ..Self::default()
        }
    }

    /// Default database location when persistence is requested without a path
    pub fn default_db_path() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|dir| dir.join("ride-dispatch").join("rides.db"))
            .ok_or_else(|| Error::Config("could not determine local data directory".to_string()))
    }
}
