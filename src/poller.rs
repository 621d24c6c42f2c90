//! Client-side status polling
//!
//! A rider's client creates a ride, then polls its status on a fixed interval
//! until the driver answers or the overall timeout passes. A timeout is read as
//! `ignored` for display; the stored record is left alone.

use crate::config::{Config, POLL_INTERVAL, POLL_TIMEOUT};
use crate::dispatch::DispatchService;
use crate::error::Result;
use crate::ride::RideStatus;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Anything that can report a ride's current status
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, ride_id: &str) -> Result<RideStatus>;
}

#[async_trait]
impl StatusSource for DispatchService {
    async fn fetch_status(&self, ride_id: &str) -> Result<RideStatus> {
        Ok(self.get_status(ride_id)?.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            timeout: POLL_TIMEOUT,
        }
    }
}

impl PollPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval,
            timeout: config.poll_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Resolved(RideStatus),
    TimedOut,
}

impl PollOutcome {
    /// Status to show the rider; an unanswered request counts as ignored
    pub fn effective_status(&self) -> RideStatus {
        match self {
            PollOutcome::Resolved(status) => *status,
            PollOutcome::TimedOut => RideStatus::Ignored,
        }
    }
}

async fn wait_for_terminal<S>(source: &S, ride_id: &str, interval: Duration) -> Result<RideStatus>
where
    S: StatusSource + ?Sized,
{
    loop {
        let status = source.fetch_status(ride_id).await?;
        if status.is_terminal() {
            return Ok(status);
        }
        debug!(ride_id = %ride_id, "Ride still pending");
        tokio::time::sleep(interval).await;
    }
}

/// Poll until the ride leaves `pending` or `policy.timeout` elapses.
/// Errors from the source (e.g. `NotFound`) end the poll early.
pub async fn poll_until_resolved<S>(source: &S, ride_id: &str, policy: PollPolicy) -> Result<PollOutcome>
where
    S: StatusSource + ?Sized,
{
    match tokio::time::timeout(policy.timeout, wait_for_terminal(source, ride_id, policy.interval)).await {
        Ok(Ok(status)) => {
            info!(ride_id = %ride_id, status = %status, "Ride resolved");
            Ok(PollOutcome::Resolved(status))
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            info!(ride_id = %ride_id, timeout = ?policy.timeout, "No driver response before timeout");
            Ok(PollOutcome::TimedOut)
        }
    }
}
