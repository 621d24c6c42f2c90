//! SQLite-backed ride store
//!
//! Same contract as the in-memory store. Status changes are a conditional
//! `UPDATE ... WHERE status = 'pending'`, so the database itself picks the
//! single winner of a racing ACCEPT/IGNORE.

use super::{check_transition, RideStore};
use crate::error::{Error, Result};
use crate::ride::{RideRequest, RideStatus};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ride_requests (
    id               TEXT PRIMARY KEY,
    rider_id         TEXT NOT NULL,
    rider_name       TEXT NOT NULL,
    pickup_location  TEXT NOT NULL,
    dropoff_location TEXT NOT NULL,
    estimated_fare   REAL NOT NULL,
    created_at_ms    INTEGER NOT NULL,
    status           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ride_requests_created ON ride_requests (created_at_ms);
"#;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn row_to_ride(row: &Row<'_>) -> rusqlite::Result<(RideRequest, String)> {
    let created_ms: i64 = row.get(6)?;
    let created_at = DateTime::from_timestamp_millis(created_ms).unwrap_or_default();
    let status: String = row.get(7)?;

    Ok((
        RideRequest {
            id: row.get(0)?,
            rider_id: row.get(1)?,
            rider_name: row.get(2)?,
            pickup_location: row.get(3)?,
            dropoff_location: row.get(4)?,
            estimated_fare: row.get(5)?,
            created_at,
            status: RideStatus::Pending,
        },
        status,
    ))
}

fn select_ride(conn: &Connection, id: &str) -> Result<Option<RideRequest>> {
    let found = conn
        .query_row(
            r#"
            SELECT id, rider_id, rider_name, pickup_location, dropoff_location,
                   estimated_fare, created_at_ms, status
            FROM ride_requests
            WHERE id = ?1
            "#,
            [id],
            row_to_ride,
        )
        .optional()?;

    match found {
        Some((mut ride, status)) => {
            ride.status = status.parse()?;
            Ok(Some(ride))
        }
        None => Ok(None),
    }
}

impl RideStore for SqliteStore {
    fn insert(&self, ride: RideRequest) -> Result<()> {
        let conn = self.conn();
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO ride_requests
                (id, rider_id, rider_name, pickup_location, dropoff_location,
                 estimated_fare, created_at_ms, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                ride.id,
                ride.rider_id,
                ride.rider_name,
                ride.pickup_location,
                ride.dropoff_location,
                ride.estimated_fare,
                ride.created_at.timestamp_millis(),
                ride.status.as_str(),
            ],
        )?;

        if inserted == 0 {
            return Err(Error::DuplicateId(ride.id));
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<RideRequest> {
        select_ride(&self.conn(), id)?.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn set_status(&self, id: &str, status: RideStatus) -> Result<RideRequest> {
        let conn = self.conn();
        check_transition(id, RideStatus::Pending, status)?;

        let updated = conn.execute(
            "UPDATE ride_requests SET status = ?2 WHERE id = ?1 AND status = 'pending'",
            params![id, status.as_str()],
        )?;

        let ride = select_ride(&conn, id)?.ok_or_else(|| Error::NotFound(id.to_string()))?;
        if updated == 0 {
            return Err(Error::InvalidTransition {
                id: id.to_string(),
                current: ride.status,
            });
        }
        Ok(ride)
    }

    fn sweep(&self, now: DateTime<Utc>, retention: Duration) -> Result<usize> {
        let cutoff = (now - retention).timestamp_millis();
        let removed = self
            .conn()
            .execute("DELETE FROM ride_requests WHERE created_at_ms < ?1", [cutoff])?;
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM ride_requests", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
