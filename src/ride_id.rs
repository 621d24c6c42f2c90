//! Ride identifier generation and validation
//!
//! Generated ids look like `RIDE1718000000000` + sequence, all upper-case ASCII so
//! they survive the upper-casing applied to inbound SMS bodies.

use crate::error::{Error, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};

pub const RIDE_ID_PREFIX: &str = "RIDE";

/// Client-supplied ids: short, no whitespace, nothing SMS keyboards mangle
static CLIENT_RIDE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("Invalid ride id regex"));

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a new ride id, unique for the lifetime of the process
pub fn generate_ride_id() -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    // Millis stay 13 digits until the year 2286, so millis + seq never collide
    format!("{}{:013}{}", RIDE_ID_PREFIX, Utc::now().timestamp_millis(), seq)
}

/// Validate and canonicalize a ride id supplied by a caller
pub fn canonical_ride_id(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if !CLIENT_RIDE_ID.is_match(trimmed) {
        return Err(Error::InvalidRequest(format!(
            "rideId must match [A-Za-z0-9_-]{{1,64}}, got {:?}",
            raw
        )));
    }
    Ok(trimmed.to_uppercase())
}
