//! HTTP client for a running dispatch server (used by the CLI poller)

use crate::error::{Error, Result};
use crate::poller::StatusSource;
use crate::ride::{NewRide, RideRequest, RideStatus};
use crate::server::{RideStatusResponse, SendNotificationRequest, SendNotificationResponse};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

pub struct DispatchClient {
    client: reqwest::Client,
    base_url: String,
}

impl DispatchClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `POST /api/sms/send-notification`
    pub async fn send_notification(
        &self,
        ride: NewRide,
        ride_id: Option<String>,
    ) -> Result<SendNotificationResponse> {
        let response = self
            .client
            .post(self.url("/api/sms/send-notification"))
            .json(&SendNotificationRequest { ride_id, ride })
            .send()
            .await?;

        let status = response.status();
        let body: SendNotificationResponse = response.json().await?;
        if !body.success {
            let message = body.error.unwrap_or(body.message);
            return Err(match status {
                StatusCode::CONFLICT => Error::DuplicateId(message),
                s if s.is_client_error() => Error::InvalidRequest(message),
                _ => Error::Server(format!("server returned {}: {}", status, message)),
            });
        }
        Ok(body)
    }

    /// `GET /api/sms/ride-status/{ride_id}`
    pub async fn ride_status(&self, ride_id: &str) -> Result<RideRequest> {
        let response = self
            .client
            .get(self.url(&format!("/api/sms/ride-status/{}", ride_id)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(ride_id.to_string()));
        }

        let status = response.status();
        let body: RideStatusResponse = response.json().await?;
        match body.ride {
            Some(ride) if body.success => Ok(ride),
            _ => Err(Error::Server(format!(
                "server returned {}: {}",
                status,
                body.error.unwrap_or_default()
            ))),
        }
    }
}

#[async_trait]
impl StatusSource for DispatchClient {
    async fn fetch_status(&self, ride_id: &str) -> Result<RideStatus> {
        Ok(self.ride_status(ride_id).await?.status)
    }
}
