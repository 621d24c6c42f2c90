//! Inbound command handler - turns a driver's SMS reply into a state transition
//!
//! Replies look like `ACCEPT <ride id>` or `IGNORE <ride id>`, any case, any
//! surrounding whitespace. The handler never fails toward the webhook caller:
//! problems are texted back to the driver instead.

use crate::channel::MessageChannel;
use crate::compose::{compose_accepted, compose_declined, compose_invalid_command, compose_ride_not_found};
use crate::dispatch::send_logged;
use crate::error::Error;
use crate::phone::{normalize_phone, same_number};
use crate::ride::{RideRequest, RideStatus};
use crate::store::RideStore;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Inbound SMS as delivered by the messaging provider's webhook
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InboundSms {
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "From", default)]
    pub from: String,
}

impl InboundSms {
    pub fn new(body: &str, from: &str) -> Self {
        Self {
            body: body.to_string(),
            from: from.to_string(),
        }
    }
}

/// Driver reply split into its two tokens, upper-cased
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverReply {
    pub action: String,
    pub ride_id: Option<String>,
}

impl DriverReply {
    pub fn parse(body: &str) -> Self {
        let normalized = body.trim().to_uppercase();
        let mut tokens = normalized.split_whitespace();
        Self {
            action: tokens.next().unwrap_or_default().to_string(),
            ride_id: tokens.next().map(str::to_string),
        }
    }
}

/// What the handler did with one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Not from the driver; dropped without reply
    UnknownSender,
    Accepted(String),
    Declined(String),
    /// Retransmitted or late reply for a ride already resolved; no reply sent
    AlreadyResolved { ride_id: String, status: RideStatus },
    RideNotFound(Option<String>),
    InvalidCommand(String),
    /// Store failure; logged and acknowledged
    Failed(String),
}

pub struct InboundHandler {
    store: Arc<dyn RideStore>,
    channel: Arc<dyn MessageChannel>,
    driver_phone: String,
}

impl InboundHandler {
    pub fn new(store: Arc<dyn RideStore>, channel: Arc<dyn MessageChannel>, driver_phone: &str) -> Self {
        Self {
            store,
            channel,
            driver_phone: normalize_phone(driver_phone),
        }
    }

    pub async fn handle(&self, sms: &InboundSms) -> InboundOutcome {
        if !same_number(&sms.from, &self.driver_phone) {
            warn!(from = %sms.from, "Ignoring inbound SMS from unknown sender");
            return InboundOutcome::UnknownSender;
        }

        let reply = DriverReply::parse(&sms.body);
        info!(action = %reply.action, ride_id = ?reply.ride_id, "Driver reply received");

        let ride_id = match reply.ride_id {
            Some(id) => id,
            None => {
                self.reply("-", &compose_ride_not_found(&sms.body, None)).await;
                return InboundOutcome::RideNotFound(None);
            }
        };

        let ride = match self.store.get(&ride_id) {
            Ok(ride) => ride,
            Err(Error::NotFound(_)) => return self.ride_not_found(&sms.body, ride_id).await,
            Err(e) => {
                error!(ride_id = %ride_id, error = %e, "Store read failed");
                return InboundOutcome::Failed(e.to_string());
            }
        };

        match reply.action.as_str() {
            "ACCEPT" => self.transition(&sms.body, ride, RideStatus::Accepted).await,
            "IGNORE" => self.transition(&sms.body, ride, RideStatus::Ignored).await,
            _ => {
                self.reply(&ride.id, &compose_invalid_command(&sms.body, &ride.id))
                    .await;
                InboundOutcome::InvalidCommand(ride.id)
            }
        }
    }

    async fn transition(&self, raw_body: &str, ride: RideRequest, status: RideStatus) -> InboundOutcome {
        match self.store.set_status(&ride.id, status) {
            Ok(updated) => {
                info!(ride_id = %updated.id, status = %updated.status, "Ride resolved by driver");
                match status {
                    RideStatus::Accepted => {
                        self.reply(&updated.id, &compose_accepted(&updated)).await;
                        InboundOutcome::Accepted(updated.id)
                    }
                    _ => {
                        self.reply(&updated.id, &compose_declined(&updated)).await;
                        InboundOutcome::Declined(updated.id)
                    }
                }
            }
            Err(Error::InvalidTransition { id, current }) => {
                info!(ride_id = %id, current = %current, "Ride already resolved, acknowledging only");
                InboundOutcome::AlreadyResolved {
                    ride_id: id,
                    status: current,
                }
            }
            // Swept between the read and the write
            Err(Error::NotFound(_)) => self.ride_not_found(raw_body, ride.id).await,
            Err(e) => {
                error!(ride_id = %ride.id, error = %e, "Store update failed");
                InboundOutcome::Failed(e.to_string())
            }
        }
    }

    async fn ride_not_found(&self, raw_body: &str, ride_id: String) -> InboundOutcome {
        warn!(ride_id = %ride_id, "Driver replied to unknown ride");
        self.reply(&ride_id, &compose_ride_not_found(raw_body, Some(&ride_id)))
            .await;
        InboundOutcome::RideNotFound(Some(ride_id))
    }

    async fn reply(&self, ride_id: &str, text: &str) {
        // Delivery failures are already logged; the ack does not depend on them
        let _ = send_logged(self.channel.as_ref(), &self.driver_phone, text, ride_id).await;
    }
}
