//! Ride request store - sole owner of live ride records
//!
//! The `RideStore` trait keeps the four store operations synchronous so a
//! persistent backend (see [`sqlite`]) can replace the in-memory map without
//! touching dispatch or inbound handling.

pub mod sqlite;

use crate::error::{Error, Result};
use crate::ride::{RideRequest, RideStatus};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

pub use sqlite::SqliteStore;

/// Keyed store of ride requests
pub trait RideStore: Send + Sync {
    /// Add a new record. Fails with `DuplicateId` if the id is live.
    fn insert(&self, ride: RideRequest) -> Result<()>;

    /// Fetch a record by id
    fn get(&self, id: &str) -> Result<RideRequest>;

    /// Move a pending record to a terminal status, returning the updated record.
    /// Exactly one caller wins per id; later callers get `InvalidTransition`.
    fn set_status(&self, id: &str, status: RideStatus) -> Result<RideRequest>;

    /// Remove every record created before `now - retention`, returning the count
    fn sweep(&self, now: DateTime<Utc>, retention: Duration) -> Result<usize>;

    /// Number of live records
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Shared transition check so every backend rejects the same moves
pub(crate) fn check_transition(id: &str, current: RideStatus, next: RideStatus) -> Result<()> {
    if current.is_terminal() || !next.is_terminal() {
        return Err(Error::InvalidTransition {
            id: id.to_string(),
            current,
        });
    }
    Ok(())
}

/// Process-lifetime store backed by a `HashMap`
#[derive(Default)]
pub struct MemoryStore {
    rides: RwLock<HashMap<String, RideRequest>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RideStore for MemoryStore {
    fn insert(&self, ride: RideRequest) -> Result<()> {
        let mut rides = self.rides.write().unwrap_or_else(PoisonError::into_inner);
        if rides.contains_key(&ride.id) {
            return Err(Error::DuplicateId(ride.id));
        }
        rides.insert(ride.id.clone(), ride);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<RideRequest> {
        let rides = self.rides.read().unwrap_or_else(PoisonError::into_inner);
        rides
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn set_status(&self, id: &str, status: RideStatus) -> Result<RideRequest> {
        // Check and write under one write guard so racing webhooks serialize here
        let mut rides = self.rides.write().unwrap_or_else(PoisonError::into_inner);
        let ride = rides
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        check_transition(id, ride.status, status)?;
        ride.status = status;
        Ok(ride.clone())
    }

    fn sweep(&self, now: DateTime<Utc>, retention: Duration) -> Result<usize> {
        let cutoff = now - retention;

        // Collect under the read lock, then take the write lock only for removal
        let expired: Vec<String> = {
            let rides = self.rides.read().unwrap_or_else(PoisonError::into_inner);
            rides
                .values()
                .filter(|r| r.created_at < cutoff)
                .map(|r| r.id.clone())
                .collect()
        };

        if expired.is_empty() {
            return Ok(0);
        }

        let mut rides = self.rides.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        for id in expired {
            if rides.get(&id).is_some_and(|r| r.created_at < cutoff) {
                rides.remove(&id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.rides.read().unwrap_or_else(PoisonError::into_inner).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ride::NewRide;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn ride_at(id: &str, created_at: DateTime<Utc>) -> RideRequest {
        RideRequest::new(
            id.to_string(),
            NewRide {
                rider_id: "r1".to_string(),
                rider_name: "Alice".to_string(),
                pickup_location: "Main St".to_string(),
                dropoff_location: "Airport".to_string(),
                estimated_fare: 0.0004,
            },
            created_at,
        )
    }

    #[test]
    fn test_insert_and_get() {
        let store = MemoryStore::new();
        store.insert(ride_at("RIDE1", Utc::now())).unwrap();

        let ride = store.get("RIDE1").unwrap();
        assert_eq!(ride.rider_name, "Alice");
        assert_eq!(ride.status, RideStatus::Pending);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_insert_duplicate() {
        let store = MemoryStore::new();
        store.insert(ride_at("RIDE1", Utc::now())).unwrap();
        let err = store.insert(ride_at("RIDE1", Utc::now())).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(ref id) if id == "RIDE1"));
    }

    #[test]
    fn test_get_missing() {
        let store = MemoryStore::new();
        assert!(matches!(store.get("NOPE"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_set_status_once() {
        let store = MemoryStore::new();
        store.insert(ride_at("RIDE1", Utc::now())).unwrap();

        let updated = store.set_status("RIDE1", RideStatus::Accepted).unwrap();
        assert_eq!(updated.status, RideStatus::Accepted);

        let err = store.set_status("RIDE1", RideStatus::Ignored).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition { current: RideStatus::Accepted, .. }
        ));
        assert_eq!(store.get("RIDE1").unwrap().status, RideStatus::Accepted);
    }

    #[test]
    fn test_set_status_back_to_pending_rejected() {
        let store = MemoryStore::new();
        store.insert(ride_at("RIDE1", Utc::now())).unwrap();
        assert!(matches!(
            store.set_status("RIDE1", RideStatus::Pending),
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_set_status_missing() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.set_status("NOPE", RideStatus::Accepted),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_sweep_retention_boundary() {
        let store = MemoryStore::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let retention = Duration::minutes(30);
        store.insert(ride_at("RIDE1", t)).unwrap();
        store.set_status("RIDE1", RideStatus::Accepted).unwrap();

        let removed = store.sweep(t + retention - Duration::seconds(1), retention).unwrap();
        assert_eq!(removed, 0);
        assert!(store.get("RIDE1").is_ok());

        let removed = store.sweep(t + retention + Duration::seconds(1), retention).unwrap();
        assert_eq!(removed, 1);
        assert!(matches!(store.get("RIDE1"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_sweep_keeps_fresh_records() {
        let store = MemoryStore::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        store.insert(ride_at("OLD", t)).unwrap();
        store.insert(ride_at("NEW", t + Duration::minutes(20))).unwrap();

        let removed = store.sweep(t + Duration::minutes(31), Duration::minutes(30)).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("NEW").is_ok());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_set_status_single_winner() {
        let store = Arc::new(MemoryStore::new());
        store.insert(ride_at("RIDE1", Utc::now())).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                let status = if i % 2 == 0 { RideStatus::Accepted } else { RideStatus::Ignored };
                std::thread::spawn(move || store.set_status("RIDE1", status).is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
