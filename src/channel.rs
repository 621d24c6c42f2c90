//! Outbound messaging channel
//!
//! Everything the dispatch core sends goes through [`MessageChannel`]. Twilio is
//! the real transport; the simulated channel stands in when credentials are
//! missing so ride state still moves.

use crate::config::TwilioConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of a send attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the carrier; `sid` is the provider's message id
    Sent { sid: String },
    /// No transport configured, nothing left the process
    Simulated,
}

impl Delivery {
    pub fn sid(&self) -> Option<&str> {
        match self {
            Delivery::Sent { sid } => Some(sid),
            Delivery::Simulated => None,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Delivery::Simulated)
    }
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Send `text` to `to`. Single attempt, no retry.
    async fn send(&self, to: &str, text: &str) -> Result<Delivery>;

    /// Short name for logs and the health endpoint
    fn name(&self) -> &'static str;
}

/// Twilio Programmable Messaging
pub struct TwilioChannel {
    client: reqwest::Client,
    config: TwilioConfig,
    api_base: String,
}

#[derive(Deserialize)]
struct TwilioMessage {
    sid: String,
}

impl TwilioChannel {
    pub const API_BASE: &'static str = "https://api.twilio.com/2010-04-01";

    pub fn new(config: TwilioConfig) -> Result<Self> {
        Self::with_api_base(config, Self::API_BASE)
    }

    /// Point at a different API root, e.g. a regional edge or a local stand-in
    pub fn with_api_base(config: TwilioConfig, api_base: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            config,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base, self.config.account_sid
        )
    }
}

#[async_trait]
impl MessageChannel for TwilioChannel {
    async fn send(&self, to: &str, text: &str) -> Result<Delivery> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("To", to), ("From", self.config.from_number.as_str()), ("Body", text)])
            .send()
            .await
            .map_err(|e| Error::ChannelUnavailable(format!("twilio request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ChannelUnavailable(format!(
                "twilio returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let message: TwilioMessage = response
            .json()
            .await
            .map_err(|e| Error::ChannelUnavailable(format!("twilio response: {}", e)))?;

        debug!(to = %to, sid = %message.sid, "SMS handed to Twilio");
        Ok(Delivery::Sent { sid: message.sid })
    }

    fn name(&self) -> &'static str {
        "twilio"
    }
}

/// Logs the message instead of sending it
#[derive(Debug, Default)]
pub struct SimulatedChannel;

#[async_trait]
impl MessageChannel for SimulatedChannel {
    async fn send(&self, to: &str, text: &str) -> Result<Delivery> {
        info!(to = %to, "[SIMULATED SMS] {}", text.replace('\n', " | "));
        Ok(Delivery::Simulated)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// A message captured by [`RecordingChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub text: String,
}

/// In-memory outbox. Can be switched to fail every send.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    outbox: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with `ChannelUnavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    async fn send(&self, to: &str, text: &str) -> Result<Delivery> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::ChannelUnavailable("recording channel set to fail".to_string()));
        }

        let mut outbox = self.outbox.lock().unwrap_or_else(PoisonError::into_inner);
        outbox.push(SentMessage {
            to: to.to_string(),
            text: text.to_string(),
        });
        Ok(Delivery::Sent {
            sid: format!("SM{:032}", outbox.len()),
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
