//! Ride request records and their status

use crate::error::{Error, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dispatch status of a ride request. Terminal once it leaves `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Pending,
    Accepted,
    Ignored,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Accepted => "accepted",
            RideStatus::Ignored => "ignored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RideStatus::Pending)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RideStatus::Pending),
            "accepted" => Ok(RideStatus::Accepted),
            "ignored" => Ok(RideStatus::Ignored),
            other => Err(Error::InvalidRequest(format!("unknown ride status: {}", other))),
        }
    }
}

/// Rider-supplied details for a new ride request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRide {
    pub rider_id: String,
    pub rider_name: String,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub estimated_fare: f64,
}

impl NewRide {
    /// Presence checks only; identity strings are not otherwise validated
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("riderId", &self.rider_id),
            ("riderName", &self.rider_name),
            ("pickupLocation", &self.pickup_location),
            ("dropoffLocation", &self.dropoff_location),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidRequest(format!("{} is required", field)));
            }
        }

        if !self.estimated_fare.is_finite() || self.estimated_fare < 0.0 {
            return Err(Error::InvalidRequest(format!(
                "estimatedFare must be a non-negative number, got {}",
                self.estimated_fare
            )));
        }

        Ok(())
    }
}

/// One rider's dispatch attempt. Serialized as the ride-status JSON view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    pub id: String,
    pub rider_id: String,
    pub rider_name: String,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub estimated_fare: f64,
    pub created_at: DateTime<Utc>,
    pub status: RideStatus,
}

impl RideRequest {
    /// `created_at` is kept at millisecond precision so every store returns it unchanged
    pub fn new(id: String, ride: NewRide, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            rider_id: ride.rider_id,
            rider_name: ride.rider_name,
            pickup_location: ride.pickup_location,
            dropoff_location: ride.dropoff_location,
            estimated_fare: ride.estimated_fare,
            created_at: created_at.trunc_subsecs(3),
            status: RideStatus::Pending,
        }
    }

    /// Fare at display precision (4 decimal places)
    pub fn fare_display(&self) -> String {
        format!("{:.4}", self.estimated_fare)
    }
}
