//! Dispatch service - creates ride requests, answers status reads, owns the sweep
//!
//! Store writes and outbound delivery are independent: a failed send never
//! rolls back the record it announces.

use crate::channel::{Delivery, MessageChannel};
use crate::compose::compose_new_request;
use crate::error::{Error, Result};
use crate::inbound::InboundHandler;
use crate::phone::normalize_phone;
use crate::ride::{NewRide, RideRequest};
use crate::ride_id::{canonical_ride_id, generate_ride_id};
use crate::store::RideStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Generated ids colliding this many times in a row means something is badly wrong
const MAX_ID_ATTEMPTS: usize = 5;

/// Result of `send_notification`
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub ride: RideRequest,
    /// `Simulated` when no transport is configured or the send failed
    pub delivery: Delivery,
    pub delivery_error: Option<String>,
}

impl SendOutcome {
    pub fn ride_id(&self) -> &str {
        &self.ride.id
    }

    pub fn simulated(&self) -> bool {
        self.delivery.is_simulated()
    }
}

/// Send one message, logging instead of failing
pub(crate) async fn send_logged(
    channel: &dyn MessageChannel,
    to: &str,
    text: &str,
    ride_id: &str,
) -> (Delivery, Option<String>) {
    match channel.send(to, text).await {
        Ok(delivery) => {
            debug!(ride_id = %ride_id, channel = channel.name(), sid = ?delivery.sid(), "SMS sent");
            (delivery, None)
        }
        Err(e) => {
            warn!(ride_id = %ride_id, channel = channel.name(), error = %e, "SMS not delivered");
            (Delivery::Simulated, Some(e.to_string()))
        }
    }
}

pub struct DispatchService {
    store: Arc<dyn RideStore>,
    channel: Arc<dyn MessageChannel>,
    driver_phone: String,
    retention: chrono::Duration,
}

impl DispatchService {
    pub fn new(
        store: Arc<dyn RideStore>,
        channel: Arc<dyn MessageChannel>,
        driver_phone: &str,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            store,
            channel,
            driver_phone: normalize_phone(driver_phone),
            retention,
        }
    }

    pub fn driver_phone(&self) -> &str {
        &self.driver_phone
    }

    pub fn channel_name(&self) -> &'static str {
        self.channel.name()
    }

    pub fn ride_count(&self) -> Result<usize> {
        self.store.len()
    }

    /// Handler for driver replies sharing this service's store and channel
    pub fn inbound_handler(&self) -> InboundHandler {
        InboundHandler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.channel),
            &self.driver_phone,
        )
    }

    /// Create a pending ride with a server-generated id and text the driver
    pub async fn send_notification(&self, ride: NewRide) -> Result<SendOutcome> {
        ride.validate()?;

        let now = Utc::now();
        let mut attempts = 0;
        let record = loop {
            attempts += 1;
            let record = RideRequest::new(generate_ride_id(), ride.clone(), now);
            match self.store.insert(record.clone()) {
                Ok(()) => break record,
                Err(Error::DuplicateId(id)) if attempts < MAX_ID_ATTEMPTS => {
                    warn!(ride_id = %id, attempts, "Generated ride ID collided, regenerating");
                }
                Err(e) => return Err(e),
            }
        };

        Ok(self.announce(record).await)
    }

    /// Create a pending ride under a caller-chosen id. `DuplicateId` if it is live.
    pub async fn send_notification_with_id(
        &self,
        ride_id: &str,
        ride: NewRide,
    ) -> Result<SendOutcome> {
        ride.validate()?;
        let record = RideRequest::new(canonical_ride_id(ride_id)?, ride, Utc::now());
        self.store.insert(record.clone())?;
        Ok(self.announce(record).await)
    }

    async fn announce(&self, ride: RideRequest) -> SendOutcome {
        info!(
            ride_id = %ride.id,
            rider_id = %ride.rider_id,
            fare = %ride.fare_display(),
            "Ride request created"
        );

        let text = compose_new_request(&ride);
        let (delivery, delivery_error) =
            send_logged(self.channel.as_ref(), &self.driver_phone, &text, &ride.id).await;

        SendOutcome {
            ride,
            delivery,
            delivery_error,
        }
    }

    /// Current record for `ride_id`
    pub fn get_status(&self, ride_id: &str) -> Result<RideRequest> {
        self.store.get(&ride_id.trim().to_uppercase())
    }

    /// Drop records past the retention window
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let removed = self.store.sweep(now, self.retention)?;
        if removed > 0 {
            info!(removed, "Swept expired ride requests");
        } else {
            debug!("Sweep found nothing to remove");
        }
        Ok(removed)
    }

    /// Run `sweep_expired` every `period` until the handle is stopped
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let service = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = service.sweep_expired(Utc::now()) {
                            error!("Sweep failed: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        debug!("Sweeper stopping");
                        break;
                    }
                }
            }
        });

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Owns the background sweep task
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for it to exit
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("Sweeper task ended abnormally: {}", e);
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.task.abort();
        }
    }
}
